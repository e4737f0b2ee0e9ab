// Central error type for the engine

use thiserror::Error;

/// Engine-level error taxonomy.
///
/// Per-job failures (`InvalidMessage`, `UnknownJobType`, `HandlerPanic`) are
/// logged and counted by the dispatch loop and never terminate it; only the
/// lifecycle variants (`Config`, `InvalidState`) surface to callers at
/// startup.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unknown job type: {queue}/{job_type}")]
    UnknownJobType { queue: String, job_type: String },

    #[error("Handler panicked: {0}")]
    HandlerPanic(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Source closed")]
    SourceClosed,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<crate::port::source::SourceError> for EngineError {
    fn from(err: crate::port::source::SourceError) -> Self {
        match err {
            crate::port::source::SourceError::Closed => EngineError::SourceClosed,
            crate::port::source::SourceError::Transport(msg) => EngineError::Transport(msg),
        }
    }
}
