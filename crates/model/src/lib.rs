pub mod consistency;
pub mod core;
pub mod execution;
pub mod pagination;
pub mod progress;
pub mod records;
pub mod scan;
