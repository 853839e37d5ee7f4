use crate::{
    consistency::{CalculationResult, ConsistencyCalculator, RowGroupStream},
    error::CalculatorError,
};
use connectors::source::RowSource;
use futures::StreamExt;
use model::{
    consistency::{
        checksum::ChecksumSummary,
        result::{CheckOutcome, Mismatch, Side, TableCheckResult},
    },
    scan::request::TableScanRequest,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs `calculator` on both sides and compares the results.
pub async fn check_table(
    calculator: &dyn ConsistencyCalculator,
    source: Arc<dyn RowSource>,
    target: Arc<dyn RowSource>,
    source_request: &TableScanRequest,
    target_request: &TableScanRequest,
) -> Result<TableCheckResult, CalculatorError> {
    let table = source_request.table_name.clone();
    let (source_result, target_result) = tokio::try_join!(
        calculator.calculate(source, source_request),
        calculator.calculate(target, target_request),
    )?;

    let result = match (source_result, target_result) {
        (CalculationResult::Checksums(a), CalculationResult::Checksums(b)) => {
            compare_checksums(&table, &a, &b)
        }
        (CalculationResult::RowGroups(a), CalculationResult::RowGroups(b)) => {
            compare_row_groups(&table, a, b).await?
        }
        _ => {
            return Err(CalculatorError::UnsupportedAlgorithm(format!(
                "{} produced different result kinds for '{table}'",
                calculator.algorithm()
            )));
        }
    };

    match &result.outcome {
        CheckOutcome::Mismatched(reason) => warn!(table = %table, %reason, "Table check mismatched"),
        _ => info!(
            table = %table,
            records = result.source_records,
            algorithm = %calculator.algorithm(),
            "Table check matched"
        ),
    }
    Ok(result)
}

pub fn compare_checksums(
    table: &str,
    source: &[ChecksumSummary],
    target: &[ChecksumSummary],
) -> TableCheckResult {
    let records = |s: &[ChecksumSummary]| s.first().map_or(0, |c| c.records_count);
    let columns = |s: &[ChecksumSummary]| s.iter().map(|c| c.column.clone()).collect::<Vec<_>>();

    let outcome = if columns(source) != columns(target) {
        CheckOutcome::Mismatched(Mismatch::Columns {
            source: columns(source),
            target: columns(target),
        })
    } else {
        source
            .iter()
            .zip(target)
            .find(|(a, b)| !a.matches(b))
            .map_or(CheckOutcome::Matched, |(a, b)| {
                CheckOutcome::Mismatched(Mismatch::Checksum {
                    column: a.column.clone(),
                    source: a.clone(),
                    target: b.clone(),
                })
            })
    };

    TableCheckResult {
        table: table.to_string(),
        outcome,
        source_records: records(source),
        target_records: records(target),
    }
}

/// Pulls chunk `i` from both sides together and stops at the first
/// difference.
pub async fn compare_row_groups(
    table: &str,
    mut source: RowGroupStream,
    mut target: RowGroupStream,
) -> Result<TableCheckResult, CalculatorError> {
    let mut source_records = 0u64;
    let mut target_records = 0u64;
    let mut chunk_index = 0usize;

    let outcome = loop {
        let (a, b) = tokio::join!(source.next(), target.next());
        match (a.transpose()?, b.transpose()?) {
            (None, None) => break CheckOutcome::Matched,
            (Some(_), None) => {
                break CheckOutcome::Mismatched(Mismatch::ChunkCount {
                    chunk_index,
                    exhausted: Side::Target,
                });
            }
            (None, Some(_)) => {
                break CheckOutcome::Mismatched(Mismatch::ChunkCount {
                    chunk_index,
                    exhausted: Side::Source,
                });
            }
            (Some(a), Some(b)) => {
                source_records += a.group_size as u64;
                target_records += b.group_size as u64;
                if a != b {
                    break CheckOutcome::Mismatched(Mismatch::Chunk { chunk_index });
                }
            }
        }
        chunk_index += 1;
    };

    Ok(TableCheckResult {
        table: table.to_string(),
        outcome,
        source_records,
        target_records,
    })
}
