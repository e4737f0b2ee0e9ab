// Domain layer - wire envelope, runtime job, configuration

pub mod config;
pub mod job;

pub use config::{EngineConfig, GoChannelConfig, QueueConfig, QueueType, SqsConfig};
pub use job::{Job, JobDesc};
