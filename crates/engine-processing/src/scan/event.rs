/// Progress message a worker sends about its own range. The receiver is the
/// single writer of the job item's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Started {
        range_key: String,
        position: Option<String>,
    },
    /// `rows` more rows reached the sink; `position` is the new resume point.
    Checkpoint {
        range_key: String,
        position: String,
        rows: u64,
    },
    Finished {
        range_key: String,
        rows: u64,
    },
    Failed {
        range_key: String,
        error: String,
    },
}

impl ScanEvent {
    pub fn range_key(&self) -> &str {
        match self {
            ScanEvent::Started { range_key, .. }
            | ScanEvent::Checkpoint { range_key, .. }
            | ScanEvent::Finished { range_key, .. }
            | ScanEvent::Failed { range_key, .. } => range_key,
        }
    }
}
