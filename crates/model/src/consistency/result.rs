use crate::consistency::checksum::ChecksumSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mismatch {
    /// Checksum or row count of one column differs.
    Checksum {
        column: String,
        source: ChecksumSummary,
        target: ChecksumSummary,
    },
    /// The columns compared on each side differ.
    Columns {
        source: Vec<String>,
        target: Vec<String>,
    },
    /// Chunk contents differ.
    Chunk { chunk_index: usize },
    /// One side produced fewer chunks.
    ChunkCount { chunk_index: usize, exhausted: Side },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Checksum {
                column,
                source,
                target,
            } => write!(
                f,
                "column '{column}' differs: source {source}, target {target}"
            ),
            Mismatch::Columns { source, target } => {
                write!(f, "column sets differ: source {source:?}, target {target:?}")
            }
            Mismatch::Chunk { chunk_index } => write!(f, "chunk {chunk_index} differs"),
            Mismatch::ChunkCount {
                chunk_index,
                exhausted,
            } => write!(f, "{exhausted} has no chunk {chunk_index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoredReason {
    NoUniqueKey,
    UnsupportedKeyType(String),
    Requested,
}

impl fmt::Display for IgnoredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoredReason::NoUniqueKey => f.write_str("table has no unique key"),
            IgnoredReason::UnsupportedKeyType(t) => write!(f, "unique key type '{t}' is not supported"),
            IgnoredReason::Requested => f.write_str("ignored by request"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckOutcome {
    Matched,
    Mismatched(Mismatch),
    Ignored(IgnoredReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCheckResult {
    pub table: String,
    pub outcome: CheckOutcome,
    pub source_records: u64,
    pub target_records: u64,
}

impl TableCheckResult {
    pub fn is_matched(&self) -> bool {
        matches!(self.outcome, CheckOutcome::Matched)
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self.outcome, CheckOutcome::Ignored(_))
    }
}

/// Job-level verdict: at least one table matched and none mismatched.
pub fn aggregate_check_results(results: &[TableCheckResult]) -> bool {
    let mut any_matched = false;
    for result in results {
        match result.outcome {
            CheckOutcome::Matched => any_matched = true,
            CheckOutcome::Mismatched(_) => return false,
            CheckOutcome::Ignored(_) => {}
        }
    }
    any_matched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(table: &str, outcome: CheckOutcome) -> TableCheckResult {
        TableCheckResult {
            table: table.into(),
            outcome,
            source_records: 0,
            target_records: 0,
        }
    }

    #[test]
    fn aggregate_requires_a_match_and_no_mismatch() {
        assert!(!aggregate_check_results(&[]));
        assert!(aggregate_check_results(&[
            result("a", CheckOutcome::Matched),
            result("b", CheckOutcome::Ignored(IgnoredReason::NoUniqueKey)),
        ]));
        assert!(!aggregate_check_results(&[
            result("a", CheckOutcome::Matched),
            result("b", CheckOutcome::Mismatched(Mismatch::Chunk { chunk_index: 2 })),
        ]));
        assert!(!aggregate_check_results(&[result(
            "b",
            CheckOutcome::Ignored(IgnoredReason::Requested)
        )]));
    }

    #[test]
    fn mismatch_messages_locate_the_divergence() {
        let msg = Mismatch::ChunkCount {
            chunk_index: 4,
            exhausted: Side::Target,
        }
        .to_string();
        assert_eq!(msg, "target has no chunk 4");
    }
}
