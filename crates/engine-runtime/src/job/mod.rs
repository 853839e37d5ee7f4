pub mod check;
pub mod inventory;
pub mod spec;

use crate::{actor::tracker::TrackerHandle, error::JobError};
use connectors::source::RowSource;
use engine_config::settings::ValidatedSettings;
use engine_core::{metrics::ScanMetrics, progress::ProgressService};
use engine_processing::scan::sink::Sink;
use model::progress::job_item::JobStatus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use check::{CheckReport, run_consistency_check};
pub use inventory::{InventoryReport, run_inventory};
pub use spec::TableSpec;

/// One shard of a job: a fixed set of tables owned by a single tracker.
#[derive(Debug, Clone)]
pub struct JobItem {
    pub job_id: String,
    pub item: u32,
    pub tables: Vec<TableSpec>,
}

impl JobItem {
    pub fn new(job_id: impl Into<String>, item: u32, tables: Vec<TableSpec>) -> Self {
        Self {
            job_id: job_id.into(),
            item,
            tables,
        }
    }

    /// Item 0 of a job with a freshly generated id.
    pub fn generate(tables: Vec<TableSpec>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), 0, tables)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.table.as_str())
    }
}

/// Services shared by every phase of a job item.
#[derive(Clone)]
pub struct JobContext {
    pub settings: ValidatedSettings,
    pub progress: ProgressService,
    pub metrics: ScanMetrics,
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn new(settings: ValidatedSettings, progress: ProgressService) -> Self {
        Self {
            settings,
            progress,
            metrics: ScanMetrics::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn open_tracker(
        &self,
        item: &JobItem,
    ) -> Result<(TrackerHandle, tokio::task::JoinHandle<()>), JobError> {
        TrackerHandle::open(
            &item.job_id,
            item.item,
            item.table_names(),
            self.progress.clone(),
            self.settings.mailbox_capacity(),
        )
        .await
    }
}

/// How far [`MigrationJob::run`] got.
#[derive(Debug)]
pub enum JobOutcome {
    /// Inventory copied and the check ran; `check.passed` tells the verdict.
    Completed {
        inventory: InventoryReport,
        check: CheckReport,
    },
    /// Cancelled during inventory; positions are saved for a later run.
    Cancelled { inventory: InventoryReport },
    /// The item had already finished before this run.
    AlreadyFinished,
}

/// Inventory copy of every table followed by a consistency check between
/// source and target.
pub struct MigrationJob {
    item: JobItem,
    source: Arc<dyn RowSource>,
    target: Arc<dyn RowSource>,
    sink: Arc<dyn Sink>,
    ctx: JobContext,
}

impl MigrationJob {
    pub fn new(
        item: JobItem,
        source: Arc<dyn RowSource>,
        target: Arc<dyn RowSource>,
        sink: Arc<dyn Sink>,
        ctx: JobContext,
    ) -> Self {
        Self {
            item,
            source,
            target,
            sink,
            ctx,
        }
    }

    pub async fn run(self) -> Result<JobOutcome, JobError> {
        let (tracker, handle) = self.ctx.open_tracker(&self.item).await?;
        let result = self.run_phases(&tracker).await;
        if let Err(err) = &result {
            mark_failed(&tracker, &self.item, err).await;
        }

        drop(tracker);
        handle.await?;
        result
    }

    async fn run_phases(&self, tracker: &TrackerHandle) -> Result<JobOutcome, JobError> {
        if tracker.snapshot().await?.status == JobStatus::Finished {
            info!(job_id = %self.item.job_id, item = self.item.item, "Job item already finished");
            return Ok(JobOutcome::AlreadyFinished);
        }

        let inventory = run_inventory(
            &self.item,
            self.source.clone(),
            self.sink.clone(),
            &self.ctx,
            tracker,
        )
        .await?;
        if inventory.cancelled {
            return Ok(JobOutcome::Cancelled { inventory });
        }

        tracker.transition(JobStatus::ConsistencyChecking).await?;
        let check = run_consistency_check(
            &self.item,
            self.source.clone(),
            self.target.clone(),
            &self.ctx,
            tracker,
        )
        .await?;
        tracker.transition(JobStatus::Finished).await?;

        Ok(JobOutcome::Completed { inventory, check })
    }
}

/// Consistency check of tables that were copied by other means.
pub struct ConsistencyCheckJob {
    item: JobItem,
    source: Arc<dyn RowSource>,
    target: Arc<dyn RowSource>,
    ctx: JobContext,
}

impl ConsistencyCheckJob {
    pub fn new(
        item: JobItem,
        source: Arc<dyn RowSource>,
        target: Arc<dyn RowSource>,
        ctx: JobContext,
    ) -> Self {
        Self {
            item,
            source,
            target,
            ctx,
        }
    }

    pub async fn run(self) -> Result<CheckReport, JobError> {
        let (tracker, handle) = self.ctx.open_tracker(&self.item).await?;

        let result = async {
            tracker.transition(JobStatus::ConsistencyChecking).await?;
            let report = run_consistency_check(
                &self.item,
                self.source.clone(),
                self.target.clone(),
                &self.ctx,
                &tracker,
            )
            .await?;
            tracker.transition(JobStatus::Finished).await?;
            Ok::<_, JobError>(report)
        }
        .await;

        if let Err(err) = &result {
            mark_failed(&tracker, &self.item, err).await;
        }
        drop(tracker);
        handle.await?;
        result
    }
}

/// Moves a still-running item to `Failed`. Errors doing so are logged; the
/// original error is what the caller gets.
async fn mark_failed(tracker: &TrackerHandle, item: &JobItem, err: &JobError) {
    warn!(job_id = %item.job_id, item = item.item, error = %err, "Job item failed");
    match tracker.snapshot().await {
        Ok(progress) if !progress.status.is_terminal() => {
            if let Err(fail_err) = tracker.fail(err.to_string()).await {
                warn!(job_id = %item.job_id, error = %fail_err, "Could not record failure");
            }
        }
        Ok(_) => {}
        Err(snapshot_err) => {
            warn!(job_id = %item.job_id, error = %snapshot_err, "Tracker unavailable")
        }
    }
}
