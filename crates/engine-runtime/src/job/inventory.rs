use crate::{
    actor::tracker::TrackerHandle,
    error::JobError,
    job::{JobContext, JobItem, TableSpec},
    pool::WorkerPool,
};
use connectors::source::RowSource;
use engine_processing::{
    retry::classify_adapter_error,
    scan::{
        reader::RangeReader,
        sink::Sink,
        worker::{InventoryScanWorker, RangeIdentity, ScanOutcome},
    },
};
use model::{
    core::sql_type::KeyKind,
    pagination::position::{Position, ResumePoint},
    progress::job_item::{JobStatus, range_key},
};
use planner::split::{KeyDomain, split};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryReport {
    /// Ranges of all tables, finished ones included.
    pub ranges: usize,
    /// Ranges that were already finished by an earlier run.
    pub skipped: usize,
    /// Rows delivered to the sink by this run.
    pub rows: u64,
    pub cancelled: bool,
}

/// Copies every table of `item` into `sink`, one worker per range, resuming
/// ranges from the tracker's recorded positions.
///
/// A failed range does not stop its siblings; once every worker returned,
/// the failures are reported together.
pub async fn run_inventory(
    item: &JobItem,
    source: Arc<dyn RowSource>,
    sink: Arc<dyn Sink>,
    ctx: &JobContext,
    tracker: &TrackerHandle,
) -> Result<InventoryReport, JobError> {
    let progress = tracker.snapshot().await?;
    match progress.status {
        JobStatus::Preparing | JobStatus::Running => {}
        status => {
            info!(job_id = %item.job_id, item = item.item, %status, "Inventory already done");
            return Ok(InventoryReport {
                ranges: progress.per_table_position.len(),
                skipped: progress.per_table_position.len(),
                ..InventoryReport::default()
            });
        }
    }

    let mut planned: Vec<(String, Position, &TableSpec)> = Vec::new();
    let mut new_ranges = Vec::new();
    for spec in &item.tables {
        let recorded: Vec<(String, String)> = progress
            .ranges_of(&spec.table)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        if recorded.is_empty() {
            let positions = plan_table(spec, &source, ctx).await?;
            for (index, position) in positions.into_iter().enumerate() {
                let key = range_key(&spec.table, index);
                if let Some(encoded) = position.encode() {
                    new_ranges.push((key.clone(), encoded));
                }
                planned.push((key, position, spec));
            }
            continue;
        }

        for (key, text) in recorded {
            match ResumePoint::from_persisted(Some(&text)) {
                ResumePoint::Resume(position) => planned.push((key, position, spec)),
                ResumePoint::Corrupted(source) => {
                    return Err(JobError::CorruptedPosition {
                        range_key: key,
                        source,
                    });
                }
                ResumePoint::NotStarted => warn!(range = %key, "Range without position skipped"),
            }
        }
    }

    if !new_ranges.is_empty() {
        tracker.plan_ranges(new_ranges).await?;
    }
    if progress.status == JobStatus::Preparing {
        tracker.transition(JobStatus::Running).await?;
    }

    let strategy = ctx.settings.query_strategy();
    let mut scans = Vec::with_capacity(planned.len());
    for (key, position, spec) in planned {
        scans.push((key, spec.request(position, strategy)?));
    }

    let mut report = InventoryReport {
        ranges: scans.len(),
        skipped: scans
            .iter()
            .filter(|(_, r)| r.position.is_finished())
            .count(),
        ..InventoryReport::default()
    };
    info!(
        job_id = %item.job_id,
        item = item.item,
        ranges = report.ranges,
        skipped = report.skipped,
        workers = ctx.settings.worker_count(),
        "Starting inventory"
    );

    let scan = ctx.settings.scan_config();
    let (events, relay) = tracker.event_channel(ctx.settings.mailbox_capacity());
    let mut pool = WorkerPool::new(ctx.settings.worker_count());
    for (key, request) in scans {
        let reader = RangeReader::new(source.clone(), scan.retry.clone(), ctx.metrics.clone());
        let mut worker = InventoryScanWorker::new(
            RangeIdentity::new(item.job_id.clone(), item.item, key.clone()),
            request,
            reader,
            sink.clone(),
            events.clone(),
            scan.batch_size,
            ctx.cancel.clone(),
        );
        pool.spawn(async move {
            let result = worker.run().await;
            (key, result)
        });
    }
    drop(events);

    let results = pool.join_all().await?;
    relay.await?;

    let mut failed = Vec::new();
    for (key, result) in results {
        match result {
            Ok(ScanOutcome::Completed { rows }) => report.rows += rows,
            Ok(ScanOutcome::Cancelled { rows, .. }) => {
                report.rows += rows;
                report.cancelled = true;
            }
            Err(err) => failed.push((key, err)),
        }
    }
    tracker.flush().await?;

    if !failed.is_empty() {
        failed.sort_by(|a, b| a.0.cmp(&b.0));
        return Err(JobError::RangesFailed { failed });
    }

    info!(
        job_id = %item.job_id,
        item = item.item,
        rows = report.rows,
        cancelled = report.cancelled,
        "Inventory done"
    );
    Ok(report)
}

/// Probes the key domain of `spec` and splits it into ranges.
async fn plan_table(
    spec: &TableSpec,
    source: &Arc<dyn RowSource>,
    ctx: &JobContext,
) -> Result<Vec<Position>, JobError> {
    let Some(key) = &spec.unique_key else {
        info!(table = %spec.table, "No unique key; table is scanned unsplit");
        return Ok(vec![Position::Unsplit]);
    };
    let kind = key.sql_type.key_kind();
    if kind == KeyKind::Unsupported {
        info!(table = %spec.table, key = %key.name, sql_type = %key.sql_type, "Key type cannot be split");
        return Ok(vec![Position::Unsplit]);
    }

    let bounds = ctx
        .settings
        .retry()
        .run(
            || {
                let source = source.clone();
                let table = spec.table.clone();
                let column = key.name.clone();
                async move { source.key_bounds(&table, &column).await }
            },
            classify_adapter_error,
        )
        .await
        .map_err(|e| JobError::Probe {
            table: spec.table.clone(),
            source: e.into_inner(),
        })?;

    let split_error = |source| JobError::Split {
        table: spec.table.clone(),
        source,
    };
    let domain = KeyDomain::from_probe(kind, bounds.min.as_ref(), bounds.max.as_ref())
        .map_err(split_error)?;
    let positions = split(&domain, ctx.settings.partitions()).map_err(split_error)?;

    info!(table = %spec.table, ranges = positions.len(), "Planned inventory ranges");
    Ok(positions)
}
