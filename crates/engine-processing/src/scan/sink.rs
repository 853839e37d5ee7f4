use crate::error::SinkError;
use async_trait::async_trait;
use model::records::batch::Batch;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Downstream consumer of scanned batches. Shared by every worker of a job
/// item, so implementations must accept concurrent producers. Delivery is
/// at-least-once: a batch may arrive again after a resume.
#[async_trait]
pub trait Sink: Send + Sync {
    /// May wait for capacity; must not drop the batch.
    async fn accept(&self, batch: Batch) -> Result<(), SinkError>;
}

/// Hands batches to a bounded channel; a full channel holds the worker back.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Batch>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Batch>) -> Self {
        Self { tx }
    }

    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Batch>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn accept(&self, batch: Batch) -> Result<(), SinkError> {
        self.tx.send(batch).await.map_err(|_| SinkError::Closed)
    }
}

/// Keeps every batch in memory.
#[derive(Clone, Default)]
pub struct CollectingSink {
    batches: Arc<Mutex<Vec<Batch>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn batches(&self) -> Vec<Batch> {
        self.batches.lock().await.clone()
    }

    /// Data rows received so far, terminal batches excluded.
    pub async fn row_count(&self) -> usize {
        self.batches.lock().await.iter().map(|b| b.rows.len()).sum()
    }
}

#[async_trait]
impl Sink for CollectingSink {
    async fn accept(&self, batch: Batch) -> Result<(), SinkError> {
        self.batches.lock().await.push(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (sink, rx) = ChannelSink::bounded(1);
        drop(rx);
        let err = sink
            .accept(Batch::finished("b".into(), "t#0".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }
}
