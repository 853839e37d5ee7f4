use chrono::{DateTime, Utc};
use model::{
    consistency::result::TableCheckResult,
    progress::job_item::{JobItemProgress, JobStatus},
};
use serde::{Deserialize, Serialize};

/// Versioned snapshot of one job item's progress.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProgressRecord {
    pub job_id: String,
    pub item: u32,
    /// Monotonic per item; a save with a version not above the stored one is
    /// stale.
    pub version: u64,
    pub progress: JobItemProgress,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CheckResultRecord {
    pub job_id: String,
    pub item: u32,
    pub results: Vec<TableCheckResult>,
    pub finished_at: DateTime<Utc>,
}

/// Whether a progress save replaced the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Applied,
    Stale { current: u64 },
}

/// Append-only audit trail of a job.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum JobEvent {
    ItemScheduled {
        job_id: String,
        item: u32,
        tables: Vec<String>,
    },
    RangeStarted {
        job_id: String,
        item: u32,
        range_key: String,
        position: String,
    },
    RangeFinished {
        job_id: String,
        item: u32,
        range_key: String,
        rows: u64,
    },
    RangeFailed {
        job_id: String,
        item: u32,
        range_key: String,
        error: String,
    },
    CheckFinished {
        job_id: String,
        item: u32,
        table: String,
        matched: bool,
    },
    ItemDone {
        job_id: String,
        item: u32,
        status: JobStatus,
    },
    Heartbeat {
        job_id: String,
        item: u32,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::ItemScheduled { job_id, .. }
            | JobEvent::RangeStarted { job_id, .. }
            | JobEvent::RangeFinished { job_id, .. }
            | JobEvent::RangeFailed { job_id, .. }
            | JobEvent::CheckFinished { job_id, .. }
            | JobEvent::ItemDone { job_id, .. }
            | JobEvent::Heartbeat { job_id, .. } => job_id,
        }
    }

    pub fn item(&self) -> u32 {
        match self {
            JobEvent::ItemScheduled { item, .. }
            | JobEvent::RangeStarted { item, .. }
            | JobEvent::RangeFinished { item, .. }
            | JobEvent::RangeFailed { item, .. }
            | JobEvent::CheckFinished { item, .. }
            | JobEvent::ItemDone { item, .. }
            | JobEvent::Heartbeat { item, .. } => *item,
        }
    }
}
