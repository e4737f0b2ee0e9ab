// SQS-style polling source (queue_type sqs)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::warn;

use crate::domain::SqsConfig;
use crate::port::source::{AckToken, Delivery, Source, SourceError};
use crate::port::sqs_client::SqsClient;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Long-poll source over a `SqsClient` transport.
///
/// The wait happens inside the client (`wait_time_seconds`), so empty polls
/// loop immediately. Transport errors are logged and retried with
/// exponential backoff capped at `MAX_BACKOFF`, reset on the next successful
/// poll. `ack` deletes by receipt handle after the handler's `done` has run.
pub struct SqsSource {
    client: Arc<dyn SqsClient>,
    config: SqsConfig,
    closed: AtomicBool,
    close_notify: Notify,
    backoff: Mutex<Duration>,
}

impl SqsSource {
    pub fn new(client: Arc<dyn SqsClient>, config: SqsConfig) -> Self {
        Self {
            client,
            config,
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            backoff: Mutex::new(INITIAL_BACKOFF),
        }
    }

    async fn next_backoff(&self) -> Duration {
        let mut backoff = self.backoff.lock().await;
        let current = *backoff;
        *backoff = (current * 2).min(MAX_BACKOFF);
        current
    }

    async fn reset_backoff(&self) {
        *self.backoff.lock().await = INITIAL_BACKOFF;
    }
}

#[async_trait]
impl Source for SqsSource {
    async fn receive(&self) -> Result<Vec<Delivery>, SourceError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(SourceError::Closed);
            }
            let poll = self.client.receive_messages(
                &self.config.queue_url,
                self.config.max_number_of_messages,
                self.config.wait_time_seconds,
            );
            let result = tokio::select! {
                result = poll => result,
                _ = self.close_notify.notified() => return Err(SourceError::Closed),
            };
            match result {
                Ok(messages) if messages.is_empty() => {
                    self.reset_backoff().await;
                }
                Ok(messages) => {
                    self.reset_backoff().await;
                    return Ok(messages
                        .into_iter()
                        .map(|msg| Delivery {
                            body: msg.body,
                            token: AckToken {
                                receipt_handle: Some(msg.receipt_handle),
                                queue_url: Some(self.config.queue_url.clone()),
                            },
                        })
                        .collect());
                }
                Err(err) => {
                    let delay = self.next_backoff().await;
                    warn!(
                        queue_url = %self.config.queue_url,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "SQS receive failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.close_notify.notified() => return Err(SourceError::Closed),
                    }
                }
            }
        }
    }

    async fn ack(&self, token: &AckToken) -> Result<(), SourceError> {
        let Some(receipt_handle) = token.receipt_handle.as_deref() else {
            return Ok(());
        };
        self.client
            .delete_message(&self.config.queue_url, receipt_handle)
            .await
    }

    async fn send_batch(&self, bodies: Vec<Vec<u8>>) -> Result<(), SourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SourceError::Closed);
        }
        for body in bodies {
            self.client
                .send_message(&self.config.queue_url, &body)
                .await?;
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_notify.notify_one();
    }
}
