pub mod query;
pub mod split;
