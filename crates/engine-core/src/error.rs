use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Failed to save progress: {0}")]
    SaveProgress(String),

    #[error("Failed to load progress: {0}")]
    LoadProgress(String),

    #[error("Failed to append job event: {0}")]
    AppendEvent(String),

    #[error("Failed to iterate job events: {0}")]
    IterateEvents(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("State store error: {0}")]
    Store(#[from] StateStoreError),

    #[error("Failed to render progress snapshot: {0}")]
    Render(#[from] serde_json::Error),
}
