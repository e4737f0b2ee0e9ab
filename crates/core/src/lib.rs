// Conveyor Core - multi-queue job worker engine
//
// A manager owns one source and one worker per enabled queue. The worker
// pulls raw messages, decodes them into job descriptors, and runs a fresh
// user handler instance per job under a two-level concurrency budget
// (queue-level intake, worker-level execution), isolating handler panics
// from the dispatch loop.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;
pub mod source;

pub use application::Manager;
pub use domain::{EngineConfig, Job, JobDesc, QueueConfig, QueueType};
pub use error::{EngineError, Result};
pub use port::{JobFailure, JobHandler};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
