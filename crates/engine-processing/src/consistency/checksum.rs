use crate::{
    consistency::{Algorithm, CalculationResult, ConsistencyCalculator},
    error::CalculatorError,
    retry::classify_adapter_error,
};
use async_trait::async_trait;
use connectors::source::RowSource;
use engine_core::retry::RetryPolicy;
use model::{consistency::checksum::ChecksumSummary, scan::request::TableScanRequest};
use std::sync::Arc;
use tracing::debug;

/// `CRC32_MATCH`: one XOR-of-CRC32 aggregate plus row count per column.
#[derive(Debug, Clone, Default)]
pub struct Crc32Calculator {
    retry: RetryPolicy,
}

impl Crc32Calculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl ConsistencyCalculator for Crc32Calculator {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Crc32Match
    }

    async fn calculate(
        &self,
        source: Arc<dyn RowSource>,
        request: &TableScanRequest,
    ) -> Result<CalculationResult, CalculatorError> {
        if !source.supports_crc32() {
            return Err(CalculatorError::UnsupportedAlgorithm(format!(
                "{} on {}",
                Algorithm::Crc32Match,
                source.name()
            )));
        }
        request.validate()?;

        let table = request.table_name.clone();
        let key = request
            .first_unique_key()
            .filter(|_| !request.is_unsplit())
            .map(|c| c.name.clone());
        let range = key.as_ref().and(request.effective_range());

        let mut summaries = Vec::with_capacity(request.column_names.len());
        for column in &request.column_names {
            let summary = self
                .retry
                .run(
                    || {
                        let source = source.clone();
                        let (table, column) = (table.clone(), column.clone());
                        let (key, range) = (key.clone(), range.clone());
                        async move {
                            source
                                .crc32_checksum(&table, &column, key.as_deref(), range.as_ref())
                                .await
                        }
                    },
                    classify_adapter_error,
                )
                .await
                .map_err(|e| CalculatorError::LoadingFailed {
                    table: table.clone(),
                    source: e.into_inner(),
                })?;

            debug!(table = %table, %summary, "Calculated column checksum");
            summaries.push(summary);
        }

        Ok(CalculationResult::Checksums(summaries))
    }
}

/// Columns of `a` and `b` agree, count and checksum alike.
pub fn summaries_match(a: &[ChecksumSummary], b: &[ChecksumSummary]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.matches(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::{
        error::AdapterError,
        memory::MemorySource,
        source::{CRC32_ALGORITHM, KeyBounds, RowStream},
        sql::base::{error::DbError, requests::FetchRowsRequest},
    };
    use futures::{StreamExt, stream};
    use model::{
        consistency::checksum::Checksum,
        core::{sql_type::SqlType, value::Value},
        pagination::{position::Position, query_range::QueryRange},
        records::row::RowData,
        scan::request::{TableScanRequestBuilder, UniqueKeyColumn},
    };
    use std::collections::HashMap;

    /// Source that answers checksum queries from a fixed table.
    struct FixedChecksums {
        checksums: HashMap<String, u32>,
        rows: u64,
        fail: bool,
    }

    impl FixedChecksums {
        fn new(checksums: &[(&str, u32)], rows: u64) -> Self {
            Self {
                checksums: checksums.iter().map(|(c, v)| (c.to_string(), *v)).collect(),
                rows,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl RowSource for FixedChecksums {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, _: &FetchRowsRequest) -> Result<Vec<RowData>, AdapterError> {
            Ok(Vec::new())
        }

        async fn stream(&self, _: &FetchRowsRequest) -> Result<RowStream, AdapterError> {
            Ok(stream::empty().boxed())
        }

        async fn key_bounds(&self, _: &str, _: &str) -> Result<KeyBounds, AdapterError> {
            Ok(KeyBounds::default())
        }

        fn supports_crc32(&self) -> bool {
            true
        }

        async fn crc32_checksum(
            &self,
            _table: &str,
            column: &str,
            _key: Option<&str>,
            _range: Option<&QueryRange>,
        ) -> Result<ChecksumSummary, AdapterError> {
            if self.fail {
                return Err(DbError::UnknownTable("foo_tbl".into()).into());
            }
            let value = self.checksums.get(column).copied();
            Ok(ChecksumSummary::new(CRC32_ALGORITHM, column, value, self.rows))
        }
    }

    fn foo_request() -> TableScanRequest {
        TableScanRequestBuilder::new("foo_tbl")
            .columns(["foo_col", "bar_col"])
            .unique_key(UniqueKeyColumn::new("id", SqlType::Integer, true))
            .position(Position::integer_range(None, None).unwrap())
            .build()
            .unwrap()
    }

    async fn checksums(source: Arc<dyn RowSource>, request: &TableScanRequest) -> Vec<ChecksumSummary> {
        match Crc32Calculator::new().calculate(source, request).await.unwrap() {
            CalculationResult::Checksums(summaries) => summaries,
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_summary_per_column() {
        let source = Arc::new(FixedChecksums::new(&[("foo_col", 123), ("bar_col", 456)], 10));
        let summaries = checksums(source, &foo_request()).await;

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].column, "foo_col");
        assert_eq!(summaries[0].checksum, Checksum::Crc32(123));
        assert_eq!(summaries[1].checksum, Checksum::Crc32(456));
        assert!(summaries.iter().all(|s| s.records_count == 10));
    }

    #[tokio::test]
    async fn identical_sides_match_and_a_changed_column_is_localized() {
        let source = checksums(
            Arc::new(FixedChecksums::new(&[("foo_col", 123), ("bar_col", 456)], 10)),
            &foo_request(),
        )
        .await;
        let same = checksums(
            Arc::new(FixedChecksums::new(&[("foo_col", 123), ("bar_col", 456)], 10)),
            &foo_request(),
        )
        .await;
        let changed = checksums(
            Arc::new(FixedChecksums::new(&[("foo_col", 123), ("bar_col", 789)], 10)),
            &foo_request(),
        )
        .await;

        assert!(summaries_match(&source, &same));
        assert!(!summaries_match(&source, &changed));
        assert!(source[0].matches(&changed[0]));
        assert!(!source[1].matches(&changed[1]));
    }

    #[tokio::test]
    async fn read_failure_is_a_loading_failure() {
        let mut fixed = FixedChecksums::new(&[("foo_col", 1)], 1);
        fixed.fail = true;
        let err = Crc32Calculator::new()
            .calculate(Arc::new(fixed), &foo_request())
            .await
            .unwrap_err();
        assert!(matches!(err, CalculatorError::LoadingFailed { ref table, .. } if table == "foo_tbl"));
    }

    #[tokio::test]
    async fn sources_without_crc32_are_unsupported() {
        let memory = MemorySource::new("pg-like").without_crc32();
        let err = Crc32Calculator::new()
            .calculate(Arc::new(memory), &foo_request())
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn computes_over_real_rows_and_is_deterministic() {
        let memory = MemorySource::new("memory");
        memory.create_table("foo_tbl", ["id", "foo_col", "bar_col"]).await;
        for id in 1..=10 {
            memory
                .insert(
                    "foo_tbl",
                    vec![Value::Int(id), Value::Int(id * 10), Value::String(format!("b{id}"))],
                )
                .await
                .unwrap();
        }
        let source: Arc<dyn RowSource> = Arc::new(memory.clone());

        let first = checksums(source.clone(), &foo_request()).await;
        let second = checksums(source.clone(), &foo_request()).await;
        assert_eq!(first, second);
        assert_eq!(first[0].records_count, 10);

        memory
            .update("foo_tbl", "id", &Value::Int(4), "bar_col", Value::String("x".into()))
            .await
            .unwrap();
        let after = checksums(source, &foo_request()).await;
        assert!(first[0].matches(&after[0]));
        assert!(!first[1].matches(&after[1]));
    }

    #[tokio::test]
    async fn empty_range_is_undefined() {
        let memory = MemorySource::new("memory");
        memory.create_table("foo_tbl", ["id", "foo_col", "bar_col"]).await;
        let summaries = checksums(Arc::new(memory), &foo_request()).await;
        assert!(summaries.iter().all(|s| s.checksum == Checksum::Undefined && s.is_empty()));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let memory = MemorySource::new("memory");
        memory.create_table("foo_tbl", ["id", "foo_col", "bar_col"]).await;
        memory.fail_next_reads(1);
        let calculator = Crc32Calculator::new().with_retry(RetryPolicy::immediate(2));
        assert!(calculator.calculate(Arc::new(memory), &foo_request()).await.is_ok());
    }
}
