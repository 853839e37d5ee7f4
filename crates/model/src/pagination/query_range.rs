use crate::{
    core::value::Value,
    pagination::position::{KeyRange, Position},
};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Read filter on the first unique key column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRange {
    pub lower: Option<Value>,
    pub lower_inclusive: bool,
    pub upper: Option<Value>,
}

impl QueryRange {
    pub fn new(lower: Option<Value>, lower_inclusive: bool, upper: Option<Value>) -> Self {
        Self {
            lower,
            lower_inclusive,
            upper,
        }
    }

    pub fn full() -> Self {
        Self::new(None, false, None)
    }

    /// Filter for a position. `None` for positions that do not bound a key.
    pub fn from_position(position: &Position) -> Option<Self> {
        match position {
            Position::BoundedRange(KeyRange::Integer(b)) => Some(Self::new(
                b.lower().map(bigint_value),
                b.lower_inclusive(),
                b.upper().map(bigint_value),
            )),
            Position::BoundedRange(KeyRange::String(b)) => Some(Self::new(
                b.lower().cloned().map(Value::String),
                b.lower_inclusive(),
                b.upper().cloned().map(Value::String),
            )),
            _ => None,
        }
    }

    /// Continues strictly after `key`, keeping the upper bound.
    pub fn after(&self, key: Value) -> Self {
        Self::new(Some(key), false, self.upper.clone())
    }

    /// True when no key can satisfy the range, e.g. `(3, 2]`.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) => match lower.compare(upper) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => !self.lower_inclusive,
                _ => false,
            },
            _ => false,
        }
    }

    pub fn contains(&self, key: &Value) -> bool {
        if let Some(lower) = &self.lower {
            match key.compare(lower) {
                Some(Ordering::Greater) => {}
                Some(Ordering::Equal) if self.lower_inclusive => {}
                _ => return false,
            }
        }
        if let Some(upper) = &self.upper {
            match key.compare(upper) {
                Some(Ordering::Less) | Some(Ordering::Equal) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Narrowest `Value` holding an arbitrary-precision integer.
pub fn bigint_value(v: &BigInt) -> Value {
    match i64::try_from(v) {
        Ok(small) => Value::Int(small),
        Err(_) => Value::Decimal(BigDecimal::from(v.clone())),
    }
}
