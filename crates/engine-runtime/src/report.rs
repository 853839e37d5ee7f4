use model::{
    consistency::result::{CheckOutcome, TableCheckResult, aggregate_check_results},
    progress::job_item::{JobItemProgress, JobStatus},
};
use serde::Serialize;

/// A table left out of the check and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoredTable {
    pub table: String,
    pub reason: Option<String>,
}

/// Operator view of a job item's consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobItemInfo {
    pub status: JobStatus,
    /// Tables that took part in the check.
    pub table_names: Vec<String>,
    pub finished_percentage: u8,
    pub duration_seconds: Option<i64>,
    pub remaining_seconds: Option<i64>,
    pub check_begin_time_millis: Option<i64>,
    pub check_end_time_millis: Option<i64>,
    /// `None` until at least one table has a result.
    pub check_success: Option<bool>,
    pub check_failed_tables: Vec<String>,
    pub ignored_tables: Vec<IgnoredTable>,
    pub error_message: Option<String>,
}

impl JobItemInfo {
    pub fn new(progress: &JobItemProgress, results: &[TableCheckResult], now_millis: i64) -> Self {
        let total = progress.total_records_count.max(0);
        let checked = progress.checked_records_count.clamp(0, total);
        let begin = progress.check_begin_time_millis;

        let (finished_percentage, duration_seconds, remaining_seconds) =
            match (progress.status, begin) {
                (JobStatus::Finished, _) => {
                    let duration = begin
                        .zip(progress.check_end_time_millis)
                        .map(|(b, e)| (e - b).max(0) / 1000);
                    (100, duration, Some(0))
                }
                (_, Some(begin)) if total > 0 && checked > 0 => {
                    let duration_millis = (now_millis - begin).max(0);
                    let remaining_millis =
                        ((total - checked) as f64 / checked as f64 * duration_millis as f64).max(0.0)
                            as i64;
                    (
                        (checked * 100 / total) as u8,
                        Some(duration_millis / 1000),
                        Some(remaining_millis / 1000),
                    )
                }
                _ => (0, None, None),
            };

        let reason_of = |table: &str| {
            results.iter().find(|r| r.table == table).and_then(|r| match &r.outcome {
                CheckOutcome::Ignored(reason) => Some(reason.to_string()),
                _ => None,
            })
        };

        Self {
            status: progress.status,
            table_names: progress
                .table_names
                .iter()
                .filter(|t| !progress.ignored_table_names.contains(*t))
                .cloned()
                .collect(),
            finished_percentage,
            duration_seconds,
            remaining_seconds,
            check_begin_time_millis: begin,
            check_end_time_millis: progress.check_end_time_millis,
            check_success: (!results.is_empty()).then(|| aggregate_check_results(results)),
            check_failed_tables: results
                .iter()
                .filter(|r| matches!(r.outcome, CheckOutcome::Mismatched(_)))
                .map(|r| r.table.clone())
                .collect(),
            ignored_tables: progress
                .ignored_table_names
                .iter()
                .map(|table| IgnoredTable {
                    table: table.clone(),
                    reason: reason_of(table),
                })
                .collect(),
            error_message: progress.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::consistency::result::{IgnoredReason, Mismatch};

    fn progress(status: JobStatus, total: i64, checked: i64) -> JobItemProgress {
        let mut progress = JobItemProgress::new(["t_order", "t_order_item", "t_log"]);
        progress.status = status;
        progress.total_records_count = total;
        progress.checked_records_count = checked;
        progress.check_begin_time_millis = Some(10_000);
        progress
    }

    fn result(table: &str, outcome: CheckOutcome) -> TableCheckResult {
        TableCheckResult {
            table: table.into(),
            outcome,
            source_records: 1,
            target_records: 1,
        }
    }

    #[test]
    fn running_check_estimates_remaining_time() {
        let info = JobItemInfo::new(&progress(JobStatus::ConsistencyChecking, 100, 25), &[], 40_000);
        assert_eq!(info.finished_percentage, 25);
        assert_eq!(info.duration_seconds, Some(30));
        // 75 rows left at 25 rows per 30s.
        assert_eq!(info.remaining_seconds, Some(90));
        assert_eq!(info.check_success, None);
    }

    #[test]
    fn nothing_checked_yet_reports_zero() {
        let info = JobItemInfo::new(&progress(JobStatus::ConsistencyChecking, 0, 0), &[], 40_000);
        assert_eq!(info.finished_percentage, 0);
        assert_eq!(info.remaining_seconds, None);

        let info = JobItemInfo::new(&progress(JobStatus::ConsistencyChecking, 50, 0), &[], 40_000);
        assert_eq!(info.finished_percentage, 0);
    }

    #[test]
    fn finished_check_is_complete() {
        let mut finished = progress(JobStatus::Finished, 100, 100);
        finished.check_end_time_millis = Some(70_000);
        finished.ignored_table_names.insert("t_log".into());

        let results = [
            result("t_order", CheckOutcome::Matched),
            result(
                "t_order_item",
                CheckOutcome::Mismatched(Mismatch::Chunk { chunk_index: 3 }),
            ),
            result("t_log", CheckOutcome::Ignored(IgnoredReason::NoUniqueKey)),
        ];
        let info = JobItemInfo::new(&finished, &results, 99_000);

        assert_eq!(info.finished_percentage, 100);
        assert_eq!(info.duration_seconds, Some(60));
        assert_eq!(info.remaining_seconds, Some(0));
        assert_eq!(info.check_success, Some(false));
        assert_eq!(info.check_failed_tables, vec!["t_order_item"]);
        assert_eq!(info.table_names, vec!["t_order", "t_order_item"]);
        assert_eq!(info.ignored_tables.len(), 1);
        assert!(info.ignored_tables[0].reason.is_some());
    }

    #[test]
    fn checked_count_is_capped_at_total() {
        let info = JobItemInfo::new(&progress(JobStatus::ConsistencyChecking, 10, 40), &[], 20_000);
        assert_eq!(info.finished_percentage, 100);
        assert_eq!(info.remaining_seconds, Some(0));
    }
}
