use serde::{Deserialize, Serialize};
use std::fmt;

/// A column checksum. `Undefined` is never equal to any computed value, so an
/// empty side cannot accidentally match a populated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checksum {
    Crc32(u32),
    Undefined,
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checksum::Crc32(v) => write!(f, "{v}"),
            Checksum::Undefined => f.write_str("undefined"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSummary {
    pub algorithm: String,
    pub column: String,
    pub checksum: Checksum,
    pub records_count: u64,
}

impl ChecksumSummary {
    /// Zero rows always yield `Checksum::Undefined`, whatever the source
    /// reported for the aggregate.
    pub fn new(
        algorithm: impl Into<String>,
        column: impl Into<String>,
        checksum: Option<u32>,
        records_count: u64,
    ) -> Self {
        let checksum = match checksum {
            Some(v) if records_count > 0 => Checksum::Crc32(v),
            _ => Checksum::Undefined,
        };
        Self {
            algorithm: algorithm.into(),
            column: column.into(),
            checksum,
            records_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records_count == 0
    }

    pub fn matches(&self, other: &ChecksumSummary) -> bool {
        self.column == other.column
            && self.records_count == other.records_count
            && self.checksum == other.checksum
    }
}

impl fmt::Display for ChecksumSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})={} over {} rows",
            self.algorithm, self.column, self.checksum, self.records_count
        )
    }
}
