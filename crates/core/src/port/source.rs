// Source port - the capability contract a queue transport exposes to a worker

use async_trait::async_trait;
use thiserror::Error;

/// Source-level errors.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source was closed; normal termination, not a failure.
    #[error("source closed")]
    Closed,

    /// Underlying I/O failure. Sources retry internally where possible;
    /// a worker that sees this logs and keeps polling.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Opaque acknowledgement token carried from receive to ack.
///
/// Empty for sources where the message is gone on receive (in-memory
/// channel); populated with the receipt handle and queue URL for SQS.
#[derive(Debug, Clone, Default)]
pub struct AckToken {
    pub receipt_handle: Option<String>,
    pub queue_url: Option<String>,
}

/// One raw message pulled from a source.
#[derive(Debug)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub token: AckToken,
}

/// Pull-based message transport.
///
/// The engine treats every source identically; adding a new transport means
/// implementing this trait, nothing in the worker changes. `receive` is
/// called from a single poll task per queue.
#[async_trait]
pub trait Source: Send + Sync {
    /// Block until at least one message is available or the source closes.
    /// Returns a batch, possibly of size 1.
    async fn receive(&self) -> Result<Vec<Delivery>, SourceError>;

    /// Irreversibly remove a message from the source. Idempotent on repeat.
    async fn ack(&self, token: &AckToken) -> Result<(), SourceError>;

    /// Enqueue raw message bodies. For transports without intrinsic local
    /// ingress this delegates to the underlying service.
    async fn send_batch(&self, bodies: Vec<Vec<u8>>) -> Result<(), SourceError>;

    /// Enqueue a single raw message body.
    async fn send(&self, body: Vec<u8>) -> Result<(), SourceError> {
        self.send_batch(vec![body]).await
    }

    /// Signal end-of-stream; subsequent `receive` returns `Closed`.
    async fn close(&self);
}
