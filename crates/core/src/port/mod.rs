// Port layer - interfaces the engine consumes and users implement

pub mod handler;
pub mod source;
pub mod sqs_client;

// Re-exports
pub use handler::{HandlerFactory, JobFailure, JobHandler};
pub use source::{AckToken, Delivery, Source, SourceError};
pub use sqs_client::{LocalSqsClient, SqsClient, SqsMessage};
