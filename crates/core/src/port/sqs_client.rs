// SQS client port - the transport surface SqsSource polls
//
// The transport itself is out of scope for the engine: production
// deployments inject their own client (Manager::with_sqs_client); local mode
// (use_local_sqs) runs on the in-process emulation below.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::source::SourceError;

/// One message returned by a receive call.
#[derive(Debug, Clone)]
pub struct SqsMessage {
    pub body: Vec<u8>,
    pub receipt_handle: String,
}

/// Minimal SQS transport surface consumed by `SqsSource`.
#[async_trait]
pub trait SqsClient: Send + Sync {
    /// Long-poll receive: up to `max_messages` messages, waiting up to
    /// `wait_time_seconds` before returning an empty batch.
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_seconds: i32,
    ) -> Result<Vec<SqsMessage>, SourceError>;

    /// Delete a received message by receipt handle. Idempotent.
    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), SourceError>;

    /// Enqueue a message body.
    async fn send_message(&self, queue_url: &str, body: &[u8]) -> Result<(), SourceError>;
}

#[derive(Default)]
struct LocalState {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    in_flight: HashMap<String, Vec<u8>>,
}

/// In-process SQS emulation backing `use_local_sqs = true`.
///
/// Per-queue-URL FIFO with long-poll semantics; received messages move to an
/// in-flight set under a fresh receipt handle until deleted. Visibility
/// timeout redelivery is not modeled. The `sent`/`deleted` counters exist so
/// tests can assert delete-exactly-once.
pub struct LocalSqsClient {
    state: Mutex<LocalState>,
    notify: Notify,
    handle_seq: AtomicU64,
    sent: AtomicU64,
    deleted: AtomicU64,
}

impl LocalSqsClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LocalState::default()),
            notify: Notify::new(),
            handle_seq: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
        }
    }

    /// Total messages accepted by `send_message`.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Total messages removed by `delete_message` (unknown handles do not
    /// count, so repeats are visible as a plateau).
    pub fn deleted_count(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    /// Messages currently queued (not yet received) on one queue URL.
    pub async fn queued_len(&self, queue_url: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue_url).map_or(0, VecDeque::len)
    }

    /// Messages received but not yet deleted, across all queues.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

impl Default for LocalSqsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SqsClient for LocalSqsClient {
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_seconds: i32,
    ) -> Result<Vec<SqsMessage>, SourceError> {
        let deadline = Instant::now() + Duration::from_secs(wait_time_seconds.max(0) as u64);
        loop {
            {
                let mut guard = self.state.lock().await;
                let LocalState { queues, in_flight } = &mut *guard;
                let queue = queues.entry(queue_url.to_string()).or_default();
                if !queue.is_empty() {
                    let n = queue.len().min(max_messages.max(1) as usize);
                    let mut batch = Vec::with_capacity(n);
                    for _ in 0..n {
                        let Some(body) = queue.pop_front() else { break };
                        let handle = format!(
                            "local-rh-{}",
                            self.handle_seq.fetch_add(1, Ordering::Relaxed)
                        );
                        in_flight.insert(handle.clone(), body.clone());
                        batch.push(SqsMessage {
                            body,
                            receipt_handle: handle,
                        });
                    }
                    return Ok(batch);
                }
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline.into()) => {}
            }
        }
    }

    async fn delete_message(
        &self,
        _queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), SourceError> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(receipt_handle).is_some() {
            self.deleted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn send_message(&self, queue_url: &str, body: &[u8]) -> Result<(), SourceError> {
        {
            let mut state = self.state.lock().await;
            state
                .queues
                .entry(queue_url.to_string())
                .or_default()
                .push_back(body.to_vec());
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        Ok(())
    }
}
