pub mod consistency;
pub mod error;
pub mod retry;
pub mod scan;
