//! In-memory transport for pipeline tests: a tokio channel standing in for
//! the broker, same at-least-once, ack-at-delivery semantics as far as the
//! pipeline can observe.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{Result, VotingError};
use crate::queue::{DeliveryStream, VoteTransport};

pub struct InMemoryTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport").finish()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoteTransport for InMemoryTransport {
    async fn publish(&self, _routing_key: &str, payload: Vec<u8>) -> Result<()> {
        self.tx
            .send(payload)
            .map_err(|_| VotingError::Validation("transport is closed".into()))
    }

    async fn subscribe(&self) -> Result<DeliveryStream> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| VotingError::Conflict("queue already has a consumer".into()))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
