//! Checkpoint positions and their persisted text form.
//!
//! A position is persisted as `"<tag>,<lower>,<upper>"` where the tag is one of
//! `i` (integer key range), `s` (string key range) or `u` (unsplit), and an
//! absent bound is an empty field. `Finished` persists as the empty string.
//!
//! A present lower bound is always exclusive: readers apply `key > lower`.
//! A range with no lower bound starts at the beginning of the key space.

use crate::core::value::Value;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};
use thiserror::Error;

const TAG_INTEGER: char = 'i';
const TAG_STRING: char = 's';
const TAG_UNSPLIT: char = 'u';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("malformed position '{text}': expected 3 comma-separated fields, found {fields}")]
    MalformedField { text: String, fields: usize },

    #[error("invalid position type tag '{tag}' in '{text}'")]
    InvalidTypeTag { text: String, tag: String },

    #[error("invalid position bound in '{text}': {reason}")]
    InvalidBound { text: String, reason: String },
}

/// Lower/upper pair of one key type. Either side may be open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds<T> {
    lower: Option<T>,
    upper: Option<T>,
}

impl<T: Ord> Bounds<T> {
    fn new(lower: Option<T>, upper: Option<T>) -> Option<Self> {
        if let (Some(l), Some(u)) = (&lower, &upper)
            && l > u
        {
            return None;
        }
        Some(Self { lower, upper })
    }

    pub fn lower(&self) -> Option<&T> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&T> {
        self.upper.as_ref()
    }

    /// An absent lower bound includes the start of the key space; a present one
    /// is filtered with `>`.
    pub fn lower_inclusive(&self) -> bool {
        self.lower.is_none()
    }

    fn cmp_bounds(&self, other: &Self) -> Ordering {
        let lower = match (&self.lower, &other.lower) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        };
        lower.then_with(|| match (&self.upper, &other.upper) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyRange {
    Integer(Bounds<BigInt>),
    String(Bounds<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    /// The key space could not be partitioned; the whole table is one range.
    Unsplit,
    BoundedRange(KeyRange),
    /// Terminal marker once a worker exhausted its range.
    Finished,
    /// No position concept applies.
    Placeholder,
}

impl Position {
    pub fn integer_range(
        lower: Option<BigInt>,
        upper: Option<BigInt>,
    ) -> Result<Self, PositionError> {
        let text = render(TAG_INTEGER, lower.as_ref(), upper.as_ref());
        Bounds::new(lower, upper)
            .map(|b| Position::BoundedRange(KeyRange::Integer(b)))
            .ok_or_else(|| inverted(text))
    }

    pub fn string_range(lower: Option<String>, upper: Option<String>) -> Result<Self, PositionError> {
        let text = render(TAG_STRING, lower.as_ref(), upper.as_ref());
        for bound in [&lower, &upper].into_iter().flatten() {
            if bound.contains(',') {
                return Err(PositionError::InvalidBound {
                    text,
                    reason: format!("string bound '{bound}' contains ','"),
                });
            }
            if bound.is_empty() {
                return Err(PositionError::InvalidBound {
                    text,
                    reason: "empty string bound is indistinguishable from an open bound".into(),
                });
            }
        }
        Bounds::new(lower, upper)
            .map(|b| Position::BoundedRange(KeyRange::String(b)))
            .ok_or_else(|| inverted(text))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Position::Finished)
    }

    pub fn key_range(&self) -> Option<&KeyRange> {
        match self {
            Position::BoundedRange(range) => Some(range),
            _ => None,
        }
    }

    /// Returns the same range with its lower bound moved to `key`, i.e. the
    /// resume point after every row up to and including `key` was handled.
    pub fn advance_to(&self, key: &Value) -> Result<Position, PositionError> {
        match self {
            Position::BoundedRange(KeyRange::Integer(b)) => {
                let lower = key.as_bigint().ok_or_else(|| PositionError::InvalidBound {
                    text: key.to_string(),
                    reason: "key is not an integer".into(),
                })?;
                Position::integer_range(Some(lower), b.upper.clone())
            }
            Position::BoundedRange(KeyRange::String(b)) => {
                let lower = match key {
                    Value::String(s) => s.clone(),
                    other => {
                        return Err(PositionError::InvalidBound {
                            text: other.to_string(),
                            reason: "key is not a string".into(),
                        });
                    }
                };
                Position::string_range(Some(lower), b.upper.clone())
            }
            other => Ok(other.clone()),
        }
    }

    /// Persisted text form. `Placeholder` has none.
    pub fn encode(&self) -> Option<String> {
        match self {
            Position::Unsplit => Some(render::<String>(TAG_UNSPLIT, None, None)),
            Position::BoundedRange(KeyRange::Integer(b)) => {
                Some(render(TAG_INTEGER, b.lower.as_ref(), b.upper.as_ref()))
            }
            Position::BoundedRange(KeyRange::String(b)) => {
                Some(render(TAG_STRING, b.lower.as_ref(), b.upper.as_ref()))
            }
            Position::Finished => Some(String::new()),
            Position::Placeholder => None,
        }
    }

    pub fn decode(text: &str) -> Result<Position, PositionError> {
        if text.is_empty() {
            return Ok(Position::Finished);
        }

        let fields: Vec<&str> = text.split(',').collect();
        if fields.len() != 3 {
            return Err(PositionError::MalformedField {
                text: text.to_string(),
                fields: fields.len(),
            });
        }

        let mut tag_chars = fields[0].chars();
        let tag = match (tag_chars.next(), tag_chars.next()) {
            (Some(tag), None) => tag,
            _ => {
                return Err(PositionError::InvalidTypeTag {
                    text: text.to_string(),
                    tag: fields[0].to_string(),
                });
            }
        };

        let (lower, upper) = (non_empty(fields[1]), non_empty(fields[2]));
        match tag {
            TAG_INTEGER => {
                let lower = lower.map(|v| parse_integer(text, v)).transpose()?;
                let upper = upper.map(|v| parse_integer(text, v)).transpose()?;
                Position::integer_range(lower, upper)
            }
            TAG_STRING => {
                Position::string_range(lower.map(str::to_string), upper.map(str::to_string))
            }
            TAG_UNSPLIT => {
                if lower.is_some() || upper.is_some() {
                    return Err(PositionError::InvalidBound {
                        text: text.to_string(),
                        reason: "unsplit position carries no bounds".into(),
                    });
                }
                Ok(Position::Unsplit)
            }
            _ => Err(PositionError::InvalidTypeTag {
                text: text.to_string(),
                tag: fields[0].to_string(),
            }),
        }
    }
}

impl FromStr for Position {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Position::decode(s)
    }
}

impl PartialOrd for Position {
    /// Only ranges of the same key type are ordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (
                Position::BoundedRange(KeyRange::Integer(a)),
                Position::BoundedRange(KeyRange::Integer(b)),
            ) => Some(a.cmp_bounds(b)),
            (
                Position::BoundedRange(KeyRange::String(a)),
                Position::BoundedRange(KeyRange::String(b)),
            ) => Some(a.cmp_bounds(b)),
            _ if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Finished => f.write_str("finished"),
            Position::Placeholder => f.write_str("placeholder"),
            other => match other.encode() {
                Some(text) => f.write_str(&text),
                None => Ok(()),
            },
        }
    }
}

/// What a persisted progress entry says about a range.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumePoint {
    /// Nothing was ever persisted for the range.
    NotStarted,
    Resume(Position),
    /// Something was persisted but cannot be decoded.
    Corrupted(PositionError),
}

impl ResumePoint {
    pub fn from_persisted(text: Option<&str>) -> Self {
        match text {
            None => ResumePoint::NotStarted,
            Some(text) => match Position::decode(text) {
                Ok(position) => ResumePoint::Resume(position),
                Err(err) => ResumePoint::Corrupted(err),
            },
        }
    }
}

fn render<T: fmt::Display>(tag: char, lower: Option<&T>, upper: Option<&T>) -> String {
    let lower = lower.map(|v| v.to_string()).unwrap_or_default();
    let upper = upper.map(|v| v.to_string()).unwrap_or_default();
    format!("{tag},{lower},{upper}")
}

fn inverted(text: String) -> PositionError {
    PositionError::InvalidBound {
        text,
        reason: "lower bound is greater than upper bound".into(),
    }
}

fn non_empty(field: &str) -> Option<&str> {
    (!field.is_empty()).then_some(field)
}

fn parse_integer(text: &str, field: &str) -> Result<BigInt, PositionError> {
    field
        .parse::<BigInt>()
        .map_err(|e| PositionError::InvalidBound {
            text: text.to_string(),
            reason: format!("'{field}' is not an integer: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(lower: Option<i64>, upper: Option<i64>) -> Position {
        Position::integer_range(lower.map(BigInt::from), upper.map(BigInt::from)).unwrap()
    }

    #[test]
    fn encodes_documented_examples() {
        assert_eq!(int(Some(1000), Some(1999)).encode().unwrap(), "i,1000,1999");
        assert_eq!(
            Position::string_range(Some("alice".into()), None)
                .unwrap()
                .encode()
                .unwrap(),
            "s,alice,"
        );
        assert_eq!(Position::Unsplit.encode().unwrap(), "u,,");
        assert_eq!(Position::Finished.encode().unwrap(), "");
        assert_eq!(Position::Placeholder.encode(), None);
    }

    #[test]
    fn round_trips_every_encodable_variant() {
        let huge: BigInt = "123456789012345678901234567890".parse().unwrap();
        let positions = vec![
            Position::Unsplit,
            Position::Finished,
            int(None, None),
            int(None, Some(10)),
            int(Some(-5), None),
            int(Some(7), Some(7)),
            Position::integer_range(Some(BigInt::from(1)), Some(huge)).unwrap(),
            Position::string_range(Some("alice".into()), Some("bob".into())).unwrap(),
            Position::string_range(None, Some("zed".into())).unwrap(),
        ];

        for p in positions {
            let text = p.encode().unwrap();
            assert_eq!(Position::decode(&text).unwrap(), p, "round trip of {text}");
        }
    }

    #[test]
    fn rejects_wrong_field_count() {
        for text in ["i,1", "i,1,2,3", "u"] {
            assert!(
                matches!(
                    Position::decode(text),
                    Err(PositionError::MalformedField { .. })
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn rejects_bad_type_tags() {
        for text in ["ix,1,2", "x,1,2", ",1,2"] {
            match Position::decode(text) {
                Err(PositionError::InvalidTypeTag { text: t, .. }) => assert_eq!(t, text),
                other => panic!("expected InvalidTypeTag for {text}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_bad_bounds() {
        for text in ["i,abc,2", "i,5,1", "u,1,", "i,1.5,"] {
            assert!(
                matches!(
                    Position::decode(text),
                    Err(PositionError::InvalidBound { .. })
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn no_coercion_between_key_types() {
        let string = Position::decode("s,1,2").unwrap();
        let integer = Position::decode("i,1,2").unwrap();
        assert_ne!(string, integer);
        assert_eq!(string.partial_cmp(&integer), None);
    }

    #[test]
    fn orders_integer_ranges_numerically() {
        let a = Position::decode("i,9,100").unwrap();
        let b = Position::decode("i,10,100").unwrap();
        assert!(a < b, "integers must not compare as text");

        let open = Position::decode("i,,100").unwrap();
        assert!(open < a);
    }

    #[test]
    fn advance_keeps_upper_bound() {
        let start = int(None, Some(50));
        let next = start.advance_to(&Value::Int(20)).unwrap();
        assert_eq!(next.encode().unwrap(), "i,20,50");

        assert!(start.advance_to(&Value::String("x".into())).is_err());
        assert_eq!(
            Position::Unsplit.advance_to(&Value::Int(1)).unwrap(),
            Position::Unsplit
        );
    }

    #[test]
    fn distinguishes_missing_from_corrupted() {
        assert_eq!(ResumePoint::from_persisted(None), ResumePoint::NotStarted);
        assert_eq!(
            ResumePoint::from_persisted(Some("i,1,2")),
            ResumePoint::Resume(int(Some(1), Some(2)))
        );
        assert!(matches!(
            ResumePoint::from_persisted(Some("garbage")),
            ResumePoint::Corrupted(_)
        ));
    }
}
