use crate::retry::classify_adapter_error;
use connectors::{
    error::AdapterError,
    source::{RowSource, RowStream},
    sql::base::requests::FetchRowsRequest,
};
use engine_core::{
    metrics::ScanMetrics,
    retry::{RetryError, RetryPolicy},
};
use model::records::row::RowData;
use std::sync::Arc;
use tracing::warn;

/// Reads rows from a source, retrying transient failures.
#[derive(Clone)]
pub struct RangeReader {
    source: Arc<dyn RowSource>,
    retry: RetryPolicy,
    metrics: ScanMetrics,
}

impl RangeReader {
    pub fn new(source: Arc<dyn RowSource>, retry: RetryPolicy, metrics: ScanMetrics) -> Self {
        Self {
            source,
            retry,
            metrics,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// One page of rows.
    pub async fn fetch(
        &self,
        request: &FetchRowsRequest,
    ) -> Result<Vec<RowData>, RetryError<AdapterError>> {
        let source = self.source.clone();
        self.retry
            .run_observed(
                || {
                    let source = source.clone();
                    let request = request.clone();
                    async move { source.fetch(&request).await }
                },
                classify_adapter_error,
                |attempt, err| self.on_retry(&request.table, attempt, err),
            )
            .await
    }

    /// Opens a forward-only read. Only opening is retried; a failure while
    /// iterating ends the stream.
    pub async fn open(&self, request: &FetchRowsRequest) -> Result<RowStream, RetryError<AdapterError>> {
        let source = self.source.clone();
        self.retry
            .run_observed(
                || {
                    let source = source.clone();
                    let request = request.clone();
                    async move { source.stream(&request).await }
                },
                classify_adapter_error,
                |attempt, err| self.on_retry(&request.table, attempt, err),
            )
            .await
    }

    fn on_retry(&self, table: &str, attempt: usize, err: &AdapterError) {
        self.metrics.increment_retries(1);
        warn!(
            source = %self.source.name(),
            table = %table,
            attempt,
            error = %err,
            "Transient read failure; retrying"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::memory::MemorySource;
    use connectors::sql::base::requests::FetchRowsRequestBuilder;
    use model::core::value::Value;

    async fn source() -> MemorySource {
        let source = MemorySource::new("memory");
        source.create_table("t_order", ["order_id", "status"]).await;
        for id in 1..=3 {
            source
                .insert("t_order", vec![Value::Int(id), Value::String("ok".into())])
                .await
                .unwrap();
        }
        source
    }

    fn request() -> FetchRowsRequest {
        FetchRowsRequestBuilder::new("t_order".into())
            .columns(vec!["order_id".into(), "status".into()])
            .unique_keys(vec!["order_id".into()])
            .range("order_id".into(), None)
            .build()
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let memory = source().await;
        memory.fail_next_reads(2);
        let metrics = ScanMetrics::new();
        let reader = RangeReader::new(Arc::new(memory.clone()), RetryPolicy::immediate(3), metrics.clone());

        let rows = reader.fetch(&request()).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(memory.read_count(), 3);
        assert_eq!(metrics.snapshot().retry_count, 2);
    }

    #[tokio::test]
    async fn surfaces_exhausted_retries() {
        let memory = source().await;
        memory.fail_next_reads(5);
        let reader = RangeReader::new(Arc::new(memory), RetryPolicy::immediate(2), ScanMetrics::new());

        let err = reader.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, RetryError::AttemptsExceeded(_)));
    }

    #[tokio::test]
    async fn does_not_retry_unknown_tables() {
        let memory = source().await;
        let reader = RangeReader::new(Arc::new(memory.clone()), RetryPolicy::immediate(5), ScanMetrics::new());
        let mut missing = request();
        missing.table = "t_missing".into();

        let err = reader.fetch(&missing).await.unwrap_err();
        assert!(matches!(err, RetryError::Fatal(_)));
        assert_eq!(memory.read_count(), 1);
    }
}
