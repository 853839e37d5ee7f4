use crate::{
    consistency::{Algorithm, CalculationResult, ConsistencyCalculator},
    error::CalculatorError,
    retry::classify_adapter_error,
};
use async_trait::async_trait;
use connectors::{
    source::RowSource,
    sql::base::requests::{FetchRowsRequest, FetchRowsRequestBuilder, RowFilter},
};
use engine_core::retry::RetryPolicy;
use futures::{StreamExt, stream};
use model::{
    consistency::row_group::RowGroup,
    execution::properties::Properties,
    pagination::query_range::QueryRange,
    records::row::RowData,
    scan::request::TableScanRequest,
};
use std::sync::Arc;
use tracing::debug;

pub const CHUNK_SIZE_KEY: &str = "chunk-size";
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// `DATA_MATCH`: rows in key order, grouped into fixed-size chunks that the
/// caller compares pairwise.
#[derive(Debug, Clone)]
pub struct RowMatchCalculator {
    chunk_size: usize,
    retry: RetryPolicy,
}

impl RowMatchCalculator {
    /// Reads `chunk-size`, which must be a positive integer when present.
    pub fn from_properties(props: &Properties) -> Result<Self, CalculatorError> {
        let chunk_size = match props.get(CHUNK_SIZE_KEY) {
            None => DEFAULT_CHUNK_SIZE,
            Some(raw) => parse_chunk_size(raw)?,
        };
        Ok(Self {
            chunk_size,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

fn parse_chunk_size(raw: &str) -> Result<usize, CalculatorError> {
    let invalid = |reason: String| CalculatorError::InvalidParameter {
        key: CHUNK_SIZE_KEY.to_string(),
        reason,
    };
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(format!("'{raw}' is not an integer")))?;
    if value <= 0 {
        return Err(invalid(format!("must be positive, got {value}")));
    }
    usize::try_from(value).map_err(|_| invalid(format!("{value} is out of range")))
}

#[async_trait]
impl ConsistencyCalculator for RowMatchCalculator {
    fn algorithm(&self) -> Algorithm {
        Algorithm::DataMatch
    }

    async fn calculate(
        &self,
        source: Arc<dyn RowSource>,
        request: &TableScanRequest,
    ) -> Result<CalculationResult, CalculatorError> {
        request.validate()?;
        let key = match request.first_unique_key() {
            Some(column) if !request.is_unsplit() => column.name.clone(),
            _ => return Err(CalculatorError::NoUniqueKey(request.table_name.clone())),
        };

        // The key column is always read so every chunk knows where it ends,
        // and it is compared like any other column.
        let mut columns = request.column_names.clone();
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(&key)) {
            columns.push(key.clone());
        }
        let template = FetchRowsRequestBuilder::new(request.table_name.clone())
            .columns(columns)
            .unique_keys(
                request
                    .unique_key_columns
                    .iter()
                    .map(|c| c.name.clone())
                    .collect(),
            )
            .limit(Some(self.chunk_size))
            .build();

        let cursor = ChunkCursor {
            source,
            template,
            key,
            range: request.effective_range().unwrap_or_else(QueryRange::full),
            chunk_size: self.chunk_size,
            retry: self.retry.clone(),
            exhausted: false,
        };
        Ok(CalculationResult::RowGroups(
            stream::try_unfold(cursor, ChunkCursor::next_chunk).boxed(),
        ))
    }
}

/// Read state between two chunks.
struct ChunkCursor {
    source: Arc<dyn RowSource>,
    template: FetchRowsRequest,
    key: String,
    range: QueryRange,
    chunk_size: usize,
    retry: RetryPolicy,
    exhausted: bool,
}

impl ChunkCursor {
    async fn next_chunk(mut self) -> Result<Option<(RowGroup, Self)>, CalculatorError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut read = self.template.clone();
        read.filter = RowFilter::Range {
            key: self.key.clone(),
            range: Some(self.range.clone()),
        };

        let source = self.source.clone();
        let rows = self
            .retry
            .run(
                || {
                    let source = source.clone();
                    let read = read.clone();
                    async move { source.fetch(&read).await }
                },
                classify_adapter_error,
            )
            .await
            .map_err(|e| CalculatorError::LoadingFailed {
                table: read.table.clone(),
                source: e.into_inner(),
            })?;

        if rows.is_empty() {
            return Ok(None);
        }
        if rows.len() < self.chunk_size {
            self.exhausted = true;
        }

        let max_unique_key = rows.last().and_then(RowData::unique_key_value).cloned();
        match &max_unique_key {
            Some(max) => self.range = self.range.after(max.clone()),
            None => self.exhausted = true,
        }

        let group = RowGroup {
            ordered_column_values: rows.iter().flat_map(RowData::values).collect(),
            group_size: rows.len(),
            max_unique_key,
        };
        debug!(
            table = %read.table,
            rows = group.group_size,
            "Calculated row-match chunk"
        );
        Ok(Some((group, self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::memory::MemorySource;
    use futures::TryStreamExt;
    use model::{
        core::{sql_type::SqlType, value::Value},
        pagination::position::Position,
        scan::request::{TableScanRequestBuilder, UniqueKeyColumn},
    };

    fn props(chunk_size: &str) -> Properties {
        Properties::new().with(CHUNK_SIZE_KEY, chunk_size)
    }

    #[test]
    fn rejects_invalid_chunk_sizes() {
        for raw in ["0", "-1", "abc", ""] {
            let err = RowMatchCalculator::from_properties(&props(raw)).unwrap_err();
            assert!(
                matches!(err, CalculatorError::InvalidParameter { ref key, .. } if key == CHUNK_SIZE_KEY),
                "chunk-size '{raw}' should be rejected"
            );
        }
    }

    #[test]
    fn accepts_positive_chunk_sizes() {
        for (raw, expected) in [("1", 1), ("1000", 1000)] {
            let calculator = RowMatchCalculator::from_properties(&props(raw)).unwrap();
            assert_eq!(calculator.chunk_size(), expected);
        }
        let default = RowMatchCalculator::from_properties(&Properties::new()).unwrap();
        assert_eq!(default.chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    async fn users(count: i64) -> MemorySource {
        let source = MemorySource::new("memory");
        source.create_table("t_user", ["user_id", "name", "age"]).await;
        for id in (1..=count).rev() {
            source
                .insert(
                    "t_user",
                    vec![Value::Int(id), Value::String(format!("u{id}")), Value::Int(20 + id)],
                )
                .await
                .unwrap();
        }
        source
    }

    fn request() -> TableScanRequest {
        TableScanRequestBuilder::new("t_user")
            .columns(["user_id", "name", "age"])
            .unique_key(UniqueKeyColumn::new("user_id", SqlType::BigInt, true))
            .position(Position::integer_range(None, None).unwrap())
            .build()
            .unwrap()
    }

    async fn groups(
        calculator: &RowMatchCalculator,
        source: MemorySource,
        request: &TableScanRequest,
    ) -> Result<Vec<RowGroup>, CalculatorError> {
        match calculator.calculate(Arc::new(source), request).await? {
            CalculationResult::RowGroups(stream) => stream.try_collect().await,
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn chunks_rows_in_key_order() {
        let calculator = RowMatchCalculator::from_properties(&props("2")).unwrap();
        let chunks = groups(&calculator, users(5).await, &request()).await.unwrap();

        let sizes: Vec<_> = chunks.iter().map(RowGroup::records_count).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let max_keys: Vec<_> = chunks.iter().map(|g| g.max_unique_key.clone()).collect();
        assert_eq!(
            max_keys,
            vec![Some(Value::Int(2)), Some(Value::Int(4)), Some(Value::Int(5))]
        );
        assert_eq!(
            chunks[0].ordered_column_values,
            vec![
                Value::Int(1),
                Value::String("u1".into()),
                Value::Int(21),
                Value::Int(2),
                Value::String("u2".into()),
                Value::Int(22)
            ]
        );
    }

    #[tokio::test]
    async fn resumes_after_the_last_chunk_key() {
        let calculator = RowMatchCalculator::from_properties(&props("2")).unwrap();
        let resumed = request().with_query_range(QueryRange::new(Some(Value::Int(2)), false, None));
        let chunks = groups(&calculator, users(5).await, &resumed).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].ordered_column_values[0], Value::Int(3));
    }

    #[tokio::test]
    async fn empty_table_and_reversed_range_yield_no_chunks() {
        let calculator = RowMatchCalculator::from_properties(&props("3")).unwrap();
        assert!(groups(&calculator, users(0).await, &request()).await.unwrap().is_empty());

        let reversed = request().with_query_range(QueryRange::new(
            Some(Value::Int(4)),
            false,
            Some(Value::Int(2)),
        ));
        assert!(groups(&calculator, users(5).await, &reversed).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn key_column_is_read_even_when_not_requested() {
        let calculator = RowMatchCalculator::from_properties(&props("2")).unwrap();
        let mut narrow = request();
        narrow.column_names = vec!["name".into()];
        let chunks = groups(&calculator, users(3).await, &narrow).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[1].ordered_column_values,
            vec![Value::String("u3".into()), Value::Int(3)]
        );
    }

    #[tokio::test]
    async fn unsplit_tables_have_no_order() {
        let calculator = RowMatchCalculator::from_properties(&props("2")).unwrap();
        let unsplit = TableScanRequestBuilder::new("t_user")
            .columns(["user_id", "name"])
            .position(Position::Unsplit)
            .build()
            .unwrap();
        let err = groups(&calculator, users(1).await, &unsplit).await.unwrap_err();
        assert!(matches!(err, CalculatorError::NoUniqueKey(_)));
    }

    #[tokio::test]
    async fn read_failure_surfaces_from_the_stream() {
        let calculator = RowMatchCalculator::from_properties(&props("2"))
            .unwrap()
            .with_retry(RetryPolicy::immediate(1));
        let source = users(3).await;
        source.fail_next_reads(1);
        let err = groups(&calculator, source, &request()).await.unwrap_err();
        assert!(matches!(err, CalculatorError::LoadingFailed { ref table, .. } if table == "t_user"));
    }
}
