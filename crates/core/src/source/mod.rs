// Concrete Source implementations

pub mod channel;
pub mod sqs;

pub use channel::ChannelSource;
pub use sqs::SqsSource;
