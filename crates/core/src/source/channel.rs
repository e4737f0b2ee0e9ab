// In-memory channel source (queue_type go_channel)

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::port::source::{AckToken, Delivery, Source, SourceError};

/// FIFO source backed by a bounded tokio channel.
///
/// Messages are gone on receive, so `ack` is a no-op. `close` drops the
/// sender: a blocked `receive` drains what is buffered, then observes
/// `Closed`; `send` after close returns `Closed` immediately.
pub struct ChannelSource {
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    rx: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl ChannelSource {
    /// `size` 0 (a synchronous rendezvous in the original Go semantics) maps
    /// to capacity 1, the smallest bounded capacity tokio offers.
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::channel(size.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl Source for ChannelSource {
    async fn receive(&self) -> Result<Vec<Delivery>, SourceError> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(body) => Ok(vec![Delivery {
                body,
                token: AckToken::default(),
            }]),
            None => Err(SourceError::Closed),
        }
    }

    async fn ack(&self, _token: &AckToken) -> Result<(), SourceError> {
        Ok(())
    }

    async fn send_batch(&self, bodies: Vec<Vec<u8>>) -> Result<(), SourceError> {
        let tx = { self.tx.lock().await.clone() };
        let Some(tx) = tx else {
            return Err(SourceError::Closed);
        };
        for body in bodies {
            tx.send(body).await.map_err(|_| SourceError::Closed)?;
        }
        Ok(())
    }

    async fn close(&self) {
        self.tx.lock().await.take();
    }
}
