use crate::{
    error::ProgressError,
    state::{
        StateStore,
        models::{CheckResultRecord, JobEvent, ProgressRecord, SaveOutcome},
    },
};
use chrono::{DateTime, Utc};
use model::{
    consistency::result::TableCheckResult,
    progress::job_item::{JobItemProgress, JobStatus},
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProgressService {
    pub store: Arc<dyn StateStore>,
}

/// Read-side view of one job item, folded from its latest snapshot and the
/// event trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemStatus {
    /// `None` until the first snapshot lands.
    pub status: Option<JobStatus>,
    pub version: u64,
    pub ranges_total: usize,
    pub ranges_finished: usize,
    pub rows_done: u64,
    pub failed_ranges: Vec<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        ProgressService { store }
    }

    pub async fn persist(
        &self,
        job_id: &str,
        item: u32,
        version: u64,
        progress: &JobItemProgress,
    ) -> Result<SaveOutcome, ProgressError> {
        let record = ProgressRecord {
            job_id: job_id.to_string(),
            item,
            version,
            progress: progress.clone(),
            updated_at: Utc::now(),
        };
        Ok(self.store.save_progress(&record).await?)
    }

    pub async fn reload(
        &self,
        job_id: &str,
        item: u32,
    ) -> Result<Option<ProgressRecord>, ProgressError> {
        Ok(self.store.load_progress(job_id, item).await?)
    }

    pub async fn record_event(&self, event: JobEvent) -> Result<(), ProgressError> {
        Ok(self.store.append_event(&event).await?)
    }

    pub async fn save_check_results(
        &self,
        job_id: &str,
        item: u32,
        results: Vec<TableCheckResult>,
    ) -> Result<(), ProgressError> {
        let record = CheckResultRecord {
            job_id: job_id.to_string(),
            item,
            results,
            finished_at: Utc::now(),
        };
        Ok(self.store.save_check_results(&record).await?)
    }

    pub async fn load_check_results(
        &self,
        job_id: &str,
        item: u32,
    ) -> Result<Option<Vec<TableCheckResult>>, ProgressError> {
        let record = self.store.load_check_results(job_id, item).await?;
        Ok(record.map(|r| r.results))
    }

    pub async fn item_status(&self, job_id: &str, item: u32) -> Result<ItemStatus, ProgressError> {
        let snapshot = self.store.load_progress(job_id, item).await?;
        let events = self.store.iter_events(job_id).await?;

        let mut rows_done = 0;
        let mut failed_ranges = Vec::new();
        let mut last_heartbeat = None;
        let mut done_status = None;

        for event in events.iter().filter(|e| e.item() == item) {
            match event {
                JobEvent::RangeFinished { rows, .. } => rows_done += rows,
                JobEvent::RangeFailed { range_key, .. } => failed_ranges.push(range_key.clone()),
                JobEvent::Heartbeat { at, .. } => last_heartbeat = Some(*at),
                JobEvent::ItemDone { status, .. } => done_status = Some(*status),
                _ => {}
            }
        }

        let (status, version, ranges_total, ranges_finished) = match &snapshot {
            Some(record) => {
                let positions = &record.progress.per_table_position;
                (
                    Some(record.progress.status),
                    record.version,
                    positions.len(),
                    positions.values().filter(|p| p.is_empty()).count(),
                )
            }
            None => (None, 0, 0, 0),
        };

        Ok(ItemStatus {
            // A terminal event outranks a snapshot that lost the race to disk.
            status: done_status.or(status),
            version,
            ranges_total,
            ranges_finished,
            rows_done,
            failed_ranges,
            last_heartbeat,
        })
    }

    /// Latest snapshot rendered as JSON, or `null` when none exists.
    pub async fn to_json(&self, job_id: &str, item: u32) -> Result<String, ProgressError> {
        let snapshot = self.store.load_progress(job_id, item).await?;
        Ok(serde_json::to_string(&snapshot.map(|r| r.progress))?)
    }
}
