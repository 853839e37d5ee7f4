pub mod sql_type;
pub mod value;
