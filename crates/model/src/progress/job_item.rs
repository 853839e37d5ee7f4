use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Preparing,
    Running,
    ConsistencyChecking,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Preparing => "PREPARING",
            JobStatus::Running => "RUNNING",
            JobStatus::ConsistencyChecking => "CONSISTENCY_CHECKING",
            JobStatus::Finished => "FINISHED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (from, to) if *from == to => true,
            (Preparing, Running | ConsistencyChecking | Failed) => true,
            (Running, ConsistencyChecking | Finished | Failed) => true,
            (ConsistencyChecking, Finished | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job item cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Change-stream progress, kept apart from per-range inventory positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalProgress {
    /// Opaque log position as reported by the change capture.
    pub position: String,
    pub last_event_time_millis: Option<i64>,
}

/// Progress of one job shard, persisted as a value snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobItemProgress {
    pub status: JobStatus,
    pub table_names: BTreeSet<String>,
    pub ignored_table_names: BTreeSet<String>,
    pub inventory_records_count: i64,
    pub checked_records_count: i64,
    pub total_records_count: i64,
    pub check_begin_time_millis: Option<i64>,
    pub check_end_time_millis: Option<i64>,
    /// Encoded position per range key (see [`range_key`]).
    pub per_table_position: BTreeMap<String, String>,
    /// Rows already counted per range whose checkpoint has not moved past
    /// them. A restart of the range reads them again.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub replayable_records: BTreeMap<String, i64>,
    pub incremental: Option<IncrementalProgress>,
    pub error_message: Option<String>,
}

impl JobItemProgress {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: JobStatus::Preparing,
            table_names: tables.into_iter().map(Into::into).collect(),
            ignored_table_names: BTreeSet::new(),
            inventory_records_count: 0,
            checked_records_count: 0,
            total_records_count: 0,
            check_begin_time_millis: None,
            check_end_time_millis: None,
            per_table_position: BTreeMap::new(),
            replayable_records: BTreeMap::new(),
            incremental: None,
            error_message: None,
        }
    }

    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn position_of(&self, range_key: &str) -> Option<&str> {
        self.per_table_position.get(range_key).map(String::as_str)
    }

    /// Range keys recorded for `table`.
    pub fn ranges_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        let prefix = format!("{table}#");
        self.per_table_position
            .iter()
            .filter(move |(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Counts a delivered batch of `rows` and moves `range_key` to `position`.
    /// Rows behind a position that did not move stay replayable.
    pub fn record_checkpoint(&mut self, range_key: String, position: String, rows: u64) {
        let rows = rows as i64;
        self.inventory_records_count += rows;
        if self.position_of(&range_key) == Some(position.as_str()) {
            *self.replayable_records.entry(range_key.clone()).or_default() += rows;
        } else {
            self.replayable_records.remove(&range_key);
        }
        self.per_table_position.insert(range_key, position);
    }

    /// Takes back the replayable rows of a range that starts reading again.
    /// Returns how many were taken back.
    pub fn restart_range(&mut self, range_key: &str) -> i64 {
        let replayed = self.replayable_records.remove(range_key).unwrap_or(0);
        self.inventory_records_count -= replayed;
        replayed
    }

    pub fn finish_range(&mut self, range_key: String) {
        self.replayable_records.remove(&range_key);
        self.per_table_position.insert(range_key, String::new());
    }

    /// Every recorded range has reached its `Finished` encoding.
    pub fn inventory_finished(&self) -> bool {
        !self.per_table_position.is_empty() && self.per_table_position.values().all(String::is_empty)
    }
}

/// Progress map key of range `index` of `table`.
pub fn range_key(table: &str, index: usize) -> String {
    format!("{table}#{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_preparing_and_rejects_leaving_terminal_states() {
        let mut progress = JobItemProgress::new(["t_order"]);
        assert_eq!(progress.status, JobStatus::Preparing);

        progress.transition(JobStatus::Running).unwrap();
        progress.transition(JobStatus::Finished).unwrap();
        let err = progress.transition(JobStatus::Running).unwrap_err();
        assert_eq!(err.from, JobStatus::Finished);
    }

    #[test]
    fn serializes_status_in_upper_snake_case() {
        let mut progress = JobItemProgress::new(["t_order"]);
        progress.status = JobStatus::ConsistencyChecking;
        progress
            .per_table_position
            .insert(range_key("t_order", 0), "i,,33".into());

        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["status"], "CONSISTENCY_CHECKING");
        assert_eq!(json["perTablePosition"]["t_order#0"], "i,,33");

        let back: JobItemProgress = serde_json::from_value(json).unwrap();
        assert_eq!(back, progress);
    }

    #[test]
    fn inventory_finished_once_every_range_is_finished() {
        let mut progress = JobItemProgress::new(["a", "b"]);
        assert!(!progress.inventory_finished());

        progress.per_table_position.insert(range_key("a", 0), String::new());
        progress.per_table_position.insert(range_key("b", 0), "i,4,9".into());
        assert!(!progress.inventory_finished());
        assert_eq!(progress.ranges_of("b").count(), 1);

        progress.per_table_position.insert(range_key("b", 0), String::new());
        assert!(progress.inventory_finished());
    }

    #[test]
    fn restarted_ranges_count_their_rows_once() {
        let mut progress = JobItemProgress::new(["t_log", "t_order"]);
        progress.per_table_position.insert(range_key("t_log", 0), "u,,".into());
        progress.per_table_position.insert(range_key("t_order", 0), "i,,9".into());

        progress.record_checkpoint(range_key("t_log", 0), "u,,".into(), 4);
        progress.record_checkpoint(range_key("t_log", 0), "u,,".into(), 4);
        progress.record_checkpoint(range_key("t_order", 0), "i,5,9".into(), 5);
        assert_eq!(progress.inventory_records_count, 13);

        // Only the unsplit range reads its rows again.
        assert_eq!(progress.restart_range("t_log#0"), 8);
        assert_eq!(progress.restart_range("t_order#0"), 0);
        assert_eq!(progress.inventory_records_count, 5);

        progress.record_checkpoint(range_key("t_log", 0), "u,,".into(), 10);
        progress.finish_range(range_key("t_log", 0));
        assert_eq!(progress.restart_range("t_log#0"), 0);
        assert_eq!(progress.inventory_records_count, 15);
        assert!(progress.replayable_records.is_empty());
    }
}
