use crate::{
    error::StateStoreError,
    state::{
        StateStore,
        models::{CheckResultRecord, JobEvent, ProgressRecord, SaveOutcome},
    },
};
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

pub struct SledStateStore {
    db: sled::Db,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub async fn flush(&self) -> Result<(), StateStoreError> {
        self.db.flush_async().await?;
        Ok(())
    }

    #[inline]
    fn progress_key(job_id: &str, item: u32) -> String {
        format!("progress:{job_id}:{item}")
    }

    #[inline]
    fn check_key(job_id: &str, item: u32) -> String {
        format!("check:{job_id}:{item}")
    }

    #[inline]
    fn event_prefix(job_id: &str) -> String {
        format!("evt:{job_id}:")
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn save_progress(&self, record: &ProgressRecord) -> Result<SaveOutcome, StateStoreError> {
        let key = Self::progress_key(&record.job_id, record.item);
        let new_bytes = bincode::serialize(record)?;

        // Check-then-set in one transaction so two writers of the same item
        // cannot interleave.
        let result = self
            .db
            .transaction::<_, _, StateStoreError>(|tx_db| {
                if let Some(existing_bytes) = tx_db.get(&key)? {
                    let existing: ProgressRecord = bincode::deserialize(&existing_bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                    if existing.version >= record.version {
                        return Ok(SaveOutcome::Stale {
                            current: existing.version,
                        });
                    }
                }
                tx_db.insert(key.as_bytes(), new_bytes.as_slice())?;
                Ok(SaveOutcome::Applied)
            });

        match result {
            Ok(outcome) => {
                if let SaveOutcome::Stale { current } = outcome {
                    debug!(
                        job_id = %record.job_id,
                        item = record.item,
                        version = record.version,
                        current,
                        "Skipped stale progress snapshot"
                    );
                }
                Ok(outcome)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StateStoreError::SaveProgress(e.to_string())),
        }
    }

    async fn load_progress(
        &self,
        job_id: &str,
        item: u32,
    ) -> Result<Option<ProgressRecord>, StateStoreError> {
        let key = Self::progress_key(job_id, item);
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_check_results(&self, record: &CheckResultRecord) -> Result<(), StateStoreError> {
        let key = Self::check_key(&record.job_id, record.item);
        let value = bincode::serialize(record)?;
        self.db.insert(key, value)?;
        Ok(())
    }

    async fn load_check_results(
        &self,
        job_id: &str,
        item: u32,
    ) -> Result<Option<CheckResultRecord>, StateStoreError> {
        let key = Self::check_key(job_id, item);
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn append_event(&self, event: &JobEvent) -> Result<(), StateStoreError> {
        // Zero-padded so lexicographic key order is append order.
        let seq = self
            .db
            .generate_id()
            .map_err(|e| StateStoreError::AppendEvent(e.to_string()))?;
        let key = format!("{}{seq:020}", Self::event_prefix(event.job_id()));
        let value = bincode::serialize(event)?;

        self.db
            .insert(key, value)
            .map_err(|e| StateStoreError::AppendEvent(e.to_string()))?;
        Ok(())
    }

    async fn iter_events(&self, job_id: &str) -> Result<Vec<JobEvent>, StateStoreError> {
        let mut events = Vec::new();
        for item in self.db.scan_prefix(Self::event_prefix(job_id)) {
            let (_key, value) = item.map_err(|e| StateStoreError::IterateEvents(e.to_string()))?;
            events.push(bincode::deserialize(&value)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::progress::job_item::{JobItemProgress, JobStatus};
    use tempfile::tempdir;

    fn record(version: u64, status: JobStatus) -> ProgressRecord {
        let mut progress = JobItemProgress::new(["t_order"]);
        progress.status = status;
        progress
            .per_table_position
            .insert("t_order#0".into(), format!("i,{version},100"));
        ProgressRecord {
            job_id: "job".into(),
            item: 0,
            version,
            progress,
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn rejects_stale_versions() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();

        assert_eq!(
            store.save_progress(&record(2, JobStatus::Running)).await.unwrap(),
            SaveOutcome::Applied
        );
        assert_eq!(
            store.save_progress(&record(1, JobStatus::Preparing)).await.unwrap(),
            SaveOutcome::Stale { current: 2 }
        );
        assert_eq!(
            store.save_progress(&record(2, JobStatus::Failed)).await.unwrap(),
            SaveOutcome::Stale { current: 2 }
        );

        let loaded = store.load_progress("job", 0).await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.progress.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn advances_with_newer_versions() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();

        store.save_progress(&record(1, JobStatus::Running)).await.unwrap();
        store.save_progress(&record(5, JobStatus::Finished)).await.unwrap();

        let loaded = store.load_progress("job", 0).await.unwrap().unwrap();
        assert_eq!(loaded.progress.status, JobStatus::Finished);
        assert_eq!(loaded.progress.position_of("t_order#0"), Some("i,5,100"));
        assert!(store.load_progress("job", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn events_come_back_in_append_order() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();

        for rows in 0..12 {
            store
                .append_event(&JobEvent::RangeFinished {
                    job_id: "job".into(),
                    item: 0,
                    range_key: format!("t#{rows}"),
                    rows,
                })
                .await
                .unwrap();
        }
        store
            .append_event(&JobEvent::ItemDone {
                job_id: "other".into(),
                item: 0,
                status: JobStatus::Finished,
            })
            .await
            .unwrap();

        let events = store.iter_events("job").await.unwrap();
        assert_eq!(events.len(), 12);
        assert!(matches!(&events[11], JobEvent::RangeFinished { rows: 11, .. }));
    }

    #[tokio::test]
    async fn check_results_are_replaced_wholesale() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        assert!(store.load_check_results("job", 0).await.unwrap().is_none());

        let first = CheckResultRecord {
            job_id: "job".into(),
            item: 0,
            results: Vec::new(),
            finished_at: chrono::Utc::now(),
        };
        store.save_check_results(&first).await.unwrap();
        let loaded = store.load_check_results("job", 0).await.unwrap().unwrap();
        assert!(loaded.results.is_empty());
    }
}
