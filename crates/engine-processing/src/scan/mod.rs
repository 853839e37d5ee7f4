pub mod config;
pub mod event;
pub mod reader;
pub mod sink;
pub mod worker;
