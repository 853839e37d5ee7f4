use crate::{
    error::StateStoreError,
    state::models::{CheckResultRecord, JobEvent, ProgressRecord, SaveOutcome},
};
use async_trait::async_trait;

pub mod models;
pub mod sled_store;

/// Durable home of job item snapshots. Writers hand over values; the store
/// never calls back into the engine.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_progress(&self, record: &ProgressRecord) -> Result<SaveOutcome, StateStoreError>;

    async fn load_progress(
        &self,
        job_id: &str,
        item: u32,
    ) -> Result<Option<ProgressRecord>, StateStoreError>;

    async fn save_check_results(&self, record: &CheckResultRecord) -> Result<(), StateStoreError>;

    async fn load_check_results(
        &self,
        job_id: &str,
        item: u32,
    ) -> Result<Option<CheckResultRecord>, StateStoreError>;

    async fn append_event(&self, event: &JobEvent) -> Result<(), StateStoreError>;

    async fn iter_events(&self, job_id: &str) -> Result<Vec<JobEvent>, StateStoreError>;
}
