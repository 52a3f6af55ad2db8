use super::DeliveryError;
use crate::record::CanonicalRecord;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A destination for delivered batches.
///
/// An error means "not ready right now": the hub re-buffers the batch and
/// waits for the consumer to be marked ready again.
#[async_trait]
pub trait Consumer: Send + Sync {
    fn id(&self) -> &str;

    async fn deliver(&self, batch: &[CanonicalRecord]) -> Result<(), DeliveryError>;
}

/// Forwards batches into a bounded channel without waiting.
pub struct ChannelConsumer {
    id: String,
    tx: mpsc::Sender<Vec<CanonicalRecord>>,
}

impl ChannelConsumer {
    pub fn new(id: impl Into<String>, tx: mpsc::Sender<Vec<CanonicalRecord>>) -> Self {
        Self { id: id.into(), tx }
    }

    /// Creates a consumer together with the receiving end of its channel.
    pub fn channel(
        id: impl Into<String>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<Vec<CanonicalRecord>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(id, tx), rx)
    }
}

#[async_trait]
impl Consumer for ChannelConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, batch: &[CanonicalRecord]) -> Result<(), DeliveryError> {
        let permit = self.tx.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => DeliveryError::NotReady(self.id.clone()),
            mpsc::error::TrySendError::Closed(()) => DeliveryError::Closed(self.id.clone()),
        })?;
        permit.send(batch.to_vec());
        Ok(())
    }
}
