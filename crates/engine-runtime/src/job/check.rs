use crate::{
    actor::tracker::TrackerHandle,
    error::JobError,
    job::{JobContext, JobItem, TableSpec},
    pool::WorkerPool,
};
use connectors::source::RowSource;
use engine_processing::{
    consistency::{Algorithm, ConsistencyCalculator, compare::check_table},
    error::CalculatorError,
};
use model::{
    consistency::result::{
        CheckOutcome, IgnoredReason, TableCheckResult, aggregate_check_results,
    },
    core::sql_type::KeyKind,
    scan::request::QueryStrategy,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    /// Algorithm actually used; may differ from the configured one when a
    /// side lacks CRC32 support.
    pub algorithm: Algorithm,
    /// One result per table, ordered by table name.
    pub results: Vec<TableCheckResult>,
    pub passed: bool,
}

impl CheckReport {
    pub fn failed_tables(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, CheckOutcome::Mismatched(_)))
            .map(|r| r.table.as_str())
            .collect()
    }
}

/// Compares every table of `item` between `source` and `target`, one task per
/// table, and records each verdict with the tracker as soon as it is known.
pub async fn run_consistency_check(
    item: &JobItem,
    source: Arc<dyn RowSource>,
    target: Arc<dyn RowSource>,
    ctx: &JobContext,
    tracker: &TrackerHandle,
) -> Result<CheckReport, JobError> {
    let progress = tracker.snapshot().await?;
    tracker
        .check_started(progress.inventory_records_count)
        .await?;

    let requested = ctx.settings.algorithm();
    let algorithm = requested.effective_for(source.as_ref(), target.as_ref());
    if algorithm != requested {
        info!(
            requested = %requested,
            effective = %algorithm,
            source = source.name(),
            target = target.name(),
            "CRC32 unavailable on one side; falling back"
        );
    }

    let strategy = ctx.settings.query_strategy();
    let mut pool = WorkerPool::new(ctx.settings.worker_count());
    for spec in item.tables.iter().cloned() {
        let calculator = ctx.settings.calculator(algorithm)?;
        let source = source.clone();
        let target = target.clone();
        let tracker = tracker.clone();
        pool.spawn(async move {
            let result = check_one(calculator.as_ref(), &spec, source, target, strategy).await;
            if let Ok(result) = &result {
                tracker.table_checked(result.clone()).await?;
            }
            result
        });
    }

    let mut results = Vec::with_capacity(item.tables.len());
    let mut first_error = None;
    for outcome in pool.join_all().await? {
        match outcome {
            Ok(result) => results.push(result),
            Err(err) => {
                error!(job_id = %item.job_id, item = item.item, error = %err, "Table check failed");
                first_error.get_or_insert(err);
            }
        }
    }
    results.sort_by(|a, b| a.table.cmp(&b.table));
    tracker.check_finished().await?;

    if let Some(err) = first_error {
        return Err(err);
    }

    let report = CheckReport {
        algorithm,
        passed: aggregate_check_results(&results),
        results,
    };
    info!(
        job_id = %item.job_id,
        item = item.item,
        algorithm = %report.algorithm,
        tables = report.results.len(),
        passed = report.passed,
        "Consistency check done"
    );
    Ok(report)
}

async fn check_one(
    calculator: &dyn ConsistencyCalculator,
    spec: &TableSpec,
    source: Arc<dyn RowSource>,
    target: Arc<dyn RowSource>,
    strategy: QueryStrategy,
) -> Result<TableCheckResult, JobError> {
    if let Some(key) = &spec.unique_key
        && spec.key_kind() == KeyKind::Unsupported
    {
        return Ok(ignored(
            spec,
            IgnoredReason::UnsupportedKeyType(key.sql_type.to_string()),
        ));
    }

    let position = spec.full_position()?;
    let source_request = spec.request(position.clone(), strategy)?;
    let target_request = spec.target_request(position, strategy)?;

    match check_table(calculator, source, target, &source_request, &target_request).await {
        Ok(result) => Ok(result),
        Err(CalculatorError::NoUniqueKey(_)) => Ok(ignored(spec, IgnoredReason::NoUniqueKey)),
        Err(source) => Err(JobError::Check {
            table: spec.table.clone(),
            source,
        }),
    }
}

fn ignored(spec: &TableSpec, reason: IgnoredReason) -> TableCheckResult {
    info!(table = %spec.table, %reason, "Table excluded from consistency check");
    TableCheckResult {
        table: spec.table.clone(),
        outcome: CheckOutcome::Ignored(reason),
        source_records: 0,
        target_records: 0,
    }
}
