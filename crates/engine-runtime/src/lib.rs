pub mod actor;
pub mod error;
pub mod job;
pub mod pool;
pub mod report;

pub use job::{ConsistencyCheckJob, JobContext, JobItem, JobOutcome, MigrationJob, TableSpec};
pub use report::JobItemInfo;
