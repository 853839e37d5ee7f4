use crate::error::JobError;
use engine_processing::scan::event::ScanEvent;
use model::{
    consistency::result::TableCheckResult,
    progress::job_item::{IncrementalProgress, JobItemProgress, JobStatus},
};
use tokio::sync::oneshot;

pub type Reply = oneshot::Sender<Result<(), JobError>>;

/// Messages for the progress tracker of one job item.
#[derive(Debug)]
pub enum TrackerMsg {
    /// Progress a scan worker reported about its own range.
    Scan(ScanEvent),

    /// Registers ranges with their starting positions. Ranges already known
    /// keep their recorded position.
    RangesPlanned(Vec<(String, String)>),

    Transition {
        status: JobStatus,
        error: Option<String>,
        reply: Reply,
    },

    /// Resets check counters before a consistency check.
    CheckStarted { total_records: i64 },

    TableChecked(TableCheckResult),

    /// Stores the collected check results and the check end time.
    CheckFinished(Reply),

    Incremental(IncrementalProgress),

    Heartbeat,

    Snapshot(oneshot::Sender<JobItemProgress>),

    /// Replies once everything received before it is persisted.
    Flush(Reply),
}
