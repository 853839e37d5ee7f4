use crate::core::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: Option<Value>,
    /// Whether the column belongs to the table's unique key.
    pub unique_key: bool,
}

impl FieldValue {
    pub fn new(name: impl Into<String>, value: Value, unique_key: bool) -> Self {
        let value = (!value.is_null()).then_some(value);
        FieldValue {
            name: name.into(),
            value,
            unique_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    pub entity: String,
    pub field_values: Vec<FieldValue>,
}

impl RowData {
    pub fn new(entity: &str, field_values: Vec<FieldValue>) -> Self {
        RowData {
            entity: entity.to_string(),
            field_values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .and_then(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    /// Value of the first unique key column, which drives ordering and
    /// positions.
    pub fn unique_key_value(&self) -> Option<&Value> {
        self.field_values
            .iter()
            .find(|f| f.unique_key)
            .and_then(|f| f.value.as_ref())
    }

    /// Marks the named columns as unique key columns, clearing the flag on all
    /// others.
    pub fn flag_unique_keys(&mut self, key_columns: &[&str]) {
        for field in &mut self.field_values {
            field.unique_key = key_columns
                .iter()
                .any(|k| k.eq_ignore_ascii_case(&field.name));
        }
    }

    /// Column values in column order, NULLs included.
    pub fn values(&self) -> Vec<Value> {
        self.field_values
            .iter()
            .map(|f| f.value.clone().unwrap_or(Value::Null))
            .collect()
    }

    /// Stable byte form of the row, used for batch manifests.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in &self.field_values {
            out.extend_from_slice(field.name.as_bytes());
            out.push(b'=');
            match field.value.as_ref().and_then(Value::checksum_bytes) {
                Some(bytes) => out.extend_from_slice(&bytes),
                None => out.extend_from_slice(b"\\N"),
            }
            out.push(0x1f);
        }
        out
    }

    pub fn size_bytes(&self) -> usize {
        self.field_values
            .iter()
            .map(|f| f.value.as_ref().map_or(0, Value::size_bytes))
            .sum()
    }
}
