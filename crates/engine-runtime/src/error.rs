use connectors::error::AdapterError;
use engine_config::error::SettingsError;
use engine_core::error::ProgressError;
use engine_processing::error::{CalculatorError, ScanError};
use model::{
    pagination::position::PositionError, progress::job_item::InvalidTransition,
    scan::request::RequestError,
};
use planner::split::SplitError;
use thiserror::Error;

/// Errors of a job item run.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to probe key domain of '{table}': {source}")]
    Probe {
        table: String,
        #[source]
        source: AdapterError,
    },

    #[error("Failed to split '{table}': {source}")]
    Split {
        table: String,
        #[source]
        source: SplitError,
    },

    /// A persisted range position cannot be decoded. The range is not
    /// restarted silently.
    #[error("Corrupted position for range {range_key}: {source}")]
    CorruptedPosition {
        range_key: String,
        #[source]
        source: PositionError,
    },

    #[error("Invalid position: {0}")]
    Position(#[from] PositionError),

    #[error("Invalid scan request: {0}")]
    Request(#[from] RequestError),

    /// At least one range failed; sibling ranges were allowed to finish.
    #[error("{} range(s) failed: {}", .failed.len(), summarize(.failed))]
    RangesFailed { failed: Vec<(String, ScanError)> },

    #[error("Consistency check of '{table}' failed: {source}")]
    Check {
        table: String,
        #[source]
        source: CalculatorError,
    },

    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    /// A worker task panicked or was aborted.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

fn summarize(failed: &[(String, ScanError)]) -> String {
    failed
        .iter()
        .map(|(range_key, err)| format!("{range_key}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Common error type for all actors in the engine.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Mailbox closed")]
    MailboxClosed,

    #[error("Actor dropped the reply channel")]
    NoReply,

    #[error("Actor internal error: {0}")]
    Internal(String),
}
