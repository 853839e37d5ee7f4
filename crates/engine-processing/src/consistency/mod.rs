//! Consistency calculators: strategies that summarize one side of a table so
//! that a caller can compare source and target.

use crate::error::CalculatorError;
use async_trait::async_trait;
use connectors::source::RowSource;
use futures::stream::BoxStream;
use model::{
    consistency::{checksum::ChecksumSummary, row_group::RowGroup},
    scan::request::TableScanRequest,
};
use std::sync::Arc;

pub mod checksum;
pub mod compare;
pub mod registry;
pub mod row_match;

pub use registry::{Algorithm, create_calculator};

/// Lazy chunks of one side, consumed at most once.
pub type RowGroupStream = BoxStream<'static, Result<RowGroup, CalculatorError>>;

pub enum CalculationResult {
    /// One summary per requested column, in column order.
    Checksums(Vec<ChecksumSummary>),
    RowGroups(RowGroupStream),
}

impl std::fmt::Debug for CalculationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalculationResult::Checksums(summaries) => {
                f.debug_tuple("Checksums").field(summaries).finish()
            }
            CalculationResult::RowGroups(_) => f.write_str("RowGroups(..)"),
        }
    }
}

/// A configured strategy. Properties are validated when the calculator is
/// built, so `calculate` only fails on reads.
#[async_trait]
pub trait ConsistencyCalculator: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Summarizes the rows `request` selects on `source`. Requests carrying a
    /// position or query range are scoped to it, so a failed range can be
    /// calculated again on its own.
    async fn calculate(
        &self,
        source: Arc<dyn RowSource>,
        request: &TableScanRequest,
    ) -> Result<CalculationResult, CalculatorError>;
}
