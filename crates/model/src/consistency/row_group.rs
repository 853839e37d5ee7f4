use crate::core::value::Value;
use serde::{Deserialize, Serialize};

/// One chunk of the row-match strategy: the non-key values of `group_size`
/// consecutive rows, in key order then column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowGroup {
    pub ordered_column_values: Vec<Value>,
    pub group_size: usize,
    /// Largest unique key value in the chunk; the next chunk starts after it.
    pub max_unique_key: Option<Value>,
}

impl RowGroup {
    pub fn records_count(&self) -> usize {
        self.group_size
    }
}
