use crate::{error::AdapterError, sql::base::requests::FetchRowsRequest};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use model::{
    consistency::checksum::ChecksumSummary, core::value::Value,
    pagination::query_range::QueryRange, records::row::RowData,
};

/// Rows of one forward-only read.
pub type RowStream = BoxStream<'static, Result<RowData, AdapterError>>;

/// Smallest and largest value of a key column. Both are `None` for an empty
/// table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyBounds {
    pub min: Option<Value>,
    pub max: Option<Value>,
}

/// Read capability over one database. Every returned row carries the unique
/// key flags named by the request.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Materializes one page of rows.
    async fn fetch(&self, request: &FetchRowsRequest) -> Result<Vec<RowData>, AdapterError>;

    /// Lazily yields the rows of one read. The stream ends after the last row
    /// or on the first error.
    async fn stream(&self, request: &FetchRowsRequest) -> Result<RowStream, AdapterError>;

    async fn key_bounds(&self, table: &str, key: &str) -> Result<KeyBounds, AdapterError>;

    /// Whether [`RowSource::crc32_checksum`] is available.
    fn supports_crc32(&self) -> bool;

    /// XOR of `CRC32(column)` over the selected rows plus their count. NULL
    /// values are skipped by the checksum but counted as rows.
    async fn crc32_checksum(
        &self,
        table: &str,
        column: &str,
        key: Option<&str>,
        range: Option<&QueryRange>,
    ) -> Result<ChecksumSummary, AdapterError>;
}

pub const CRC32_ALGORITHM: &str = "CRC32";
