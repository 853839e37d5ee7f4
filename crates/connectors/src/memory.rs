//! In-process row source. Backs tests and local runs, and mirrors the SQL
//! sources' semantics: `>`/`<=` range filters, key ordering, `LIMIT` pages and
//! a NULL-skipping CRC32 aggregate.

use crate::{
    error::AdapterError,
    source::{CRC32_ALGORITHM, KeyBounds, RowSource, RowStream},
    sql::base::{
        error::DbError,
        requests::{FetchRowsRequest, RowFilter},
    },
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use model::{
    consistency::checksum::ChecksumSummary,
    core::value::Value,
    pagination::query_range::QueryRange,
    records::row::{FieldValue, RowData},
};
use std::{
    cmp::Ordering,
    collections::HashMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
    },
};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    fn column_index(&self, table: &str, column: &str) -> Result<usize, DbError> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .ok_or_else(|| DbError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }
}

#[derive(Clone)]
pub struct MemorySource {
    name: String,
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
    crc32: bool,
    /// Number of upcoming reads that fail with a connection error.
    failures: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Arc::new(RwLock::new(HashMap::new())),
            crc32: true,
            failures: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source that, like PostgreSQL, has no CRC32 aggregate.
    pub fn without_crc32(mut self) -> Self {
        self.crc32 = false;
        self
    }

    pub async fn create_table<I, S>(&self, table: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table_def = MemoryTable {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        };
        self.tables.write().await.insert(table.to_string(), table_def);
    }

    pub async fn insert(&self, table: &str, row: Vec<Value>) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;
        if row.len() != entry.columns.len() {
            return Err(DbError::Unknown(format!(
                "table '{table}' has {} columns, row has {}",
                entry.columns.len(),
                row.len()
            )));
        }
        entry.rows.push(row);
        Ok(())
    }

    /// Sets `column` to `value` on every row whose `key` equals `key_value`.
    /// Returns the number of rows changed.
    pub async fn update(
        &self,
        table: &str,
        key: &str,
        key_value: &Value,
        column: &str,
        value: Value,
    ) -> Result<usize, DbError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;
        let key_idx = entry.column_index(table, key)?;
        let col_idx = entry.column_index(table, column)?;

        let mut changed = 0;
        for row in entry.rows.iter_mut() {
            if row[key_idx].compare(key_value) == Some(Ordering::Equal) {
                row[col_idx] = value.clone();
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub async fn delete(&self, table: &str, key: &str, key_value: &Value) -> Result<usize, DbError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;
        let key_idx = entry.column_index(table, key)?;
        let before = entry.rows.len();
        entry
            .rows
            .retain(|row| row[key_idx].compare(key_value) != Some(Ordering::Equal));
        Ok(before - entry.rows.len())
    }

    /// Makes the next `count` reads fail with a retryable connection error.
    pub fn fail_next_reads(&self, count: usize) {
        self.failures.store(count, AtomicOrdering::SeqCst);
    }

    /// Total number of reads served or failed so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(AtomicOrdering::SeqCst)
    }

    fn check_available(&self) -> Result<(), DbError> {
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        let injected = self
            .failures
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok();
        if injected {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("{}: connection reset", self.name),
            )));
        }
        Ok(())
    }

    async fn select(&self, request: &FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        self.check_available()?;

        let tables = self.tables.read().await;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| DbError::UnknownTable(request.table.clone()))?;
        let projection = request
            .columns
            .iter()
            .map(|c| table.column_index(&request.table, c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut selected: Vec<&Vec<Value>> = match &request.filter {
            RowFilter::All => table.rows.iter().collect(),
            RowFilter::Range { key, range } => {
                let key_idx = table.column_index(&request.table, key)?;
                let mut rows: Vec<&Vec<Value>> = table
                    .rows
                    .iter()
                    .filter(|row| in_range(&row[key_idx], range.as_ref()))
                    .collect();
                rows.sort_by(|a, b| {
                    a[key_idx]
                        .compare(&b[key_idx])
                        .unwrap_or(Ordering::Equal)
                });
                rows
            }
            RowFilter::Point { key, value } => {
                let key_idx = table.column_index(&request.table, key)?;
                table
                    .rows
                    .iter()
                    .filter(|row| row[key_idx].compare(value) == Some(Ordering::Equal))
                    .collect()
            }
        };
        if let Some(limit) = request.limit {
            selected.truncate(limit);
        }

        let keys = request.unique_key_refs();
        let rows = selected
            .into_iter()
            .map(|row| {
                let fields = projection
                    .iter()
                    .zip(&request.columns)
                    .map(|(idx, name)| {
                        let is_key = keys.iter().any(|k| k.eq_ignore_ascii_case(name));
                        FieldValue::new(name.clone(), row[*idx].clone(), is_key)
                    })
                    .collect();
                RowData::new(&request.table, fields)
            })
            .collect();
        Ok(rows)
    }
}

/// SQL semantics: NULL keys never satisfy a comparison.
fn in_range(key: &Value, range: Option<&QueryRange>) -> bool {
    if key.is_null() {
        return false;
    }
    range.is_none_or(|r| r.contains(key))
}

#[async_trait]
impl RowSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRowsRequest) -> Result<Vec<RowData>, AdapterError> {
        let rows = self.select(request).await?;
        debug!(source = %self.name, table = %request.table, rows = rows.len(), "Fetched rows");
        Ok(rows)
    }

    async fn stream(&self, request: &FetchRowsRequest) -> Result<RowStream, AdapterError> {
        let rows = self.select(request).await?;
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    async fn key_bounds(&self, table: &str, key: &str) -> Result<KeyBounds, AdapterError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let entry = tables
            .get(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;
        let key_idx = entry.column_index(table, key)?;

        let mut bounds = KeyBounds::default();
        for value in entry.rows.iter().map(|r| &r[key_idx]).filter(|v| !v.is_null()) {
            if bounds
                .min
                .as_ref()
                .is_none_or(|m| value.compare(m) == Some(Ordering::Less))
            {
                bounds.min = Some(value.clone());
            }
            if bounds
                .max
                .as_ref()
                .is_none_or(|m| value.compare(m) == Some(Ordering::Greater))
            {
                bounds.max = Some(value.clone());
            }
        }
        Ok(bounds)
    }

    fn supports_crc32(&self) -> bool {
        self.crc32
    }

    async fn crc32_checksum(
        &self,
        table: &str,
        column: &str,
        key: Option<&str>,
        range: Option<&QueryRange>,
    ) -> Result<ChecksumSummary, AdapterError> {
        if !self.crc32 {
            return Err(AdapterError::Unsupported {
                source_name: self.name.clone(),
                operation: "CRC32 checksum".into(),
            });
        }
        self.check_available()?;

        let tables = self.tables.read().await;
        let entry = tables
            .get(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;
        let col_idx = entry.column_index(table, column)?;
        let key_idx = key.map(|k| entry.column_index(table, k)).transpose()?;

        // BIT_XOR over no values is 0, so an all-NULL column still has a checksum.
        let mut checksum = 0u32;
        let mut count = 0u64;
        for row in &entry.rows {
            if let Some(key_idx) = key_idx
                && range.is_some()
                && !in_range(&row[key_idx], range)
            {
                continue;
            }
            count += 1;
            if let Some(bytes) = row[col_idx].checksum_bytes() {
                checksum ^= crc32fast::hash(&bytes);
            }
        }

        Ok(ChecksumSummary::new(
            CRC32_ALGORITHM,
            column,
            Some(checksum),
            count,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::base::requests::FetchRowsRequestBuilder;
    use model::consistency::checksum::Checksum;

    async fn orders() -> MemorySource {
        let source = MemorySource::new("memory");
        source
            .create_table("t_order", ["order_id", "status"])
            .await;
        for id in [5, 1, 3, 2, 4] {
            source
                .insert("t_order", vec![Value::Int(id), Value::from(format!("s{id}"))])
                .await
                .unwrap();
        }
        source
    }

    fn range_request(range: Option<QueryRange>, limit: Option<usize>) -> FetchRowsRequest {
        FetchRowsRequestBuilder::new("t_order".into())
            .columns(vec!["order_id".into(), "status".into()])
            .unique_keys(vec!["order_id".into()])
            .range("order_id".into(), range)
            .limit(limit)
            .build()
    }

    #[tokio::test]
    async fn range_reads_are_ordered_exclusive_and_limited() {
        let source = orders().await;
        let range = QueryRange::new(Some(Value::Int(1)), false, Some(Value::Int(4)));
        let rows = source.fetch(&range_request(Some(range), Some(2))).await.unwrap();

        let keys: Vec<_> = rows.iter().map(|r| r.get_value("order_id")).collect();
        assert_eq!(keys, vec![Value::Int(2), Value::Int(3)]);
        assert!(rows[0].get("order_id").unwrap().unique_key);
        assert!(!rows[0].get("status").unwrap().unique_key);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let source = orders().await;
        source.fail_next_reads(1);
        assert!(source.fetch(&range_request(None, None)).await.is_err());
        assert_eq!(source.fetch(&range_request(None, None)).await.unwrap().len(), 5);
        assert_eq!(source.read_count(), 2);
    }

    #[tokio::test]
    async fn checksum_skips_nulls_but_counts_rows() {
        let source = orders().await;
        source
            .update("t_order", "order_id", &Value::Int(3), "status", Value::Null)
            .await
            .unwrap();

        let summary = source
            .crc32_checksum("t_order", "status", None, None)
            .await
            .unwrap();
        let expected = ["s5", "s1", "s2", "s4"]
            .iter()
            .fold(0u32, |acc, s| acc ^ crc32fast::hash(s.as_bytes()));
        assert_eq!(summary.checksum, Checksum::Crc32(expected));
        assert_eq!(summary.records_count, 5);
    }

    #[tokio::test]
    async fn all_null_column_checksums_to_zero() {
        let source = MemorySource::new("memory");
        source.create_table("t_order", ["order_id", "remark"]).await;
        for id in 1..=3 {
            source
                .insert("t_order", vec![Value::Int(id), Value::Null])
                .await
                .unwrap();
        }

        let summary = source
            .crc32_checksum("t_order", "remark", None, None)
            .await
            .unwrap();
        assert_eq!(summary.checksum, Checksum::Crc32(0));
        assert_eq!(summary.records_count, 3);
    }

    #[tokio::test]
    async fn empty_table_has_undefined_checksum() {
        let source = MemorySource::new("memory");
        source.create_table("empty", ["id"]).await;
        let summary = source.crc32_checksum("empty", "id", None, None).await.unwrap();
        assert_eq!(summary.checksum, Checksum::Undefined);
        assert_eq!(summary.records_count, 0);

        let bounds = source.key_bounds("empty", "id").await.unwrap();
        assert_eq!(bounds, KeyBounds::default());
    }

    #[tokio::test]
    async fn key_bounds_and_unsupported_checksum() {
        let source = orders().await.without_crc32();
        let bounds = source.key_bounds("t_order", "order_id").await.unwrap();
        assert_eq!(bounds.min, Some(Value::Int(1)));
        assert_eq!(bounds.max, Some(Value::Int(5)));

        let err = source
            .crc32_checksum("t_order", "status", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported { .. }));
    }
}
