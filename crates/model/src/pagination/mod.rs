pub mod position;
pub mod query_range;
