use crate::{pagination::position::Position, records::row::RowData};

/// Rows read from one range between two checkpoints.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    /// Progress key of the range that produced the batch.
    pub range_key: String,
    pub rows: Vec<RowData>,
    /// Resume-from position once this batch is handled.
    pub next: Position,
    pub manifest: Manifest,
    pub ts: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub row_count: usize,
    pub checksum_crc32: u32,
}

pub fn manifest_for(rows: &[RowData]) -> Manifest {
    let mut hasher = crc32fast::Hasher::new();
    for r in rows {
        hasher.update(&r.canonical_bytes());
    }
    Manifest {
        row_count: rows.len(),
        checksum_crc32: hasher.finalize(),
    }
}

impl Batch {
    /// Terminal batch carrying no rows and a `Finished` position.
    pub fn finished(id: String, range_key: String) -> Self {
        Batch {
            id,
            range_key,
            rows: Vec::new(),
            next: Position::Finished,
            manifest: manifest_for(&[]),
            ts: chrono::Utc::now(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.next.is_finished()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.rows.iter().map(|r| r.size_bytes()).sum()
    }
}
