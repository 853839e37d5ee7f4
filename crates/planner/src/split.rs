//! Partitions a table's unique key domain into disjoint ranges for parallel
//! inventory workers.
//!
//! Range 0 has no lower bound. Every later range's lower bound equals the
//! previous range's upper bound and is applied with `>`, so no successor
//! operation on the key type is needed and no key lands in two ranges.

use model::{
    core::{sql_type::KeyKind, value::Value},
    pagination::position::{Position, PositionError},
};
use num_bigint::BigInt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("desired partitions must be at least 1, got {0}")]
    InvalidPartitions(usize),

    #[error("minimum key {min} is greater than maximum key {max}")]
    Inverted { min: String, max: String },

    #[error("key value {0} does not match the declared key type")]
    KeyTypeMismatch(String),

    #[error(transparent)]
    Position(#[from] PositionError),
}

/// Observed key domain of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDomain {
    Integer { min: BigInt, max: Option<BigInt> },
    String { min: String, max: Option<String> },
    /// Key is usable but the table has no rows.
    Empty(KeyKind),
    /// No unique key, or one of an unsupported type.
    Unusable,
}

impl KeyDomain {
    /// Builds a domain from a `MIN`/`MAX` probe of the first unique key column.
    pub fn from_probe(
        kind: KeyKind,
        min: Option<&Value>,
        max: Option<&Value>,
    ) -> Result<Self, SplitError> {
        let Some(min) = min.filter(|v| !v.is_null()) else {
            return Ok(match kind {
                KeyKind::Unsupported => KeyDomain::Unusable,
                kind => KeyDomain::Empty(kind),
            });
        };
        let max = max.filter(|v| !v.is_null());

        match kind {
            KeyKind::Integer => {
                let as_int = |v: &Value| {
                    v.as_bigint()
                        .ok_or_else(|| SplitError::KeyTypeMismatch(v.to_string()))
                };
                Ok(KeyDomain::Integer {
                    min: as_int(min)?,
                    max: max.map(as_int).transpose()?,
                })
            }
            KeyKind::String => {
                let as_str = |v: &Value| match v {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(SplitError::KeyTypeMismatch(other.to_string())),
                };
                Ok(KeyDomain::String {
                    min: as_str(min)?,
                    max: max.map(as_str).transpose()?,
                })
            }
            KeyKind::Unsupported => Ok(KeyDomain::Unusable),
        }
    }
}

/// Splits `domain` into at most `desired` non-empty ranges.
pub fn split(domain: &KeyDomain, desired: usize) -> Result<Vec<Position>, SplitError> {
    if desired < 1 {
        return Err(SplitError::InvalidPartitions(desired));
    }

    let positions = match domain {
        KeyDomain::Unusable => vec![Position::Unsplit],
        KeyDomain::Empty(KeyKind::String) => vec![Position::string_range(None, None)?],
        KeyDomain::Empty(_) => vec![Position::integer_range(None, None)?],
        KeyDomain::Integer { min, max: None } => {
            debug!(%min, "open-ended integer domain; single range");
            vec![Position::integer_range(None, None)?]
        }
        KeyDomain::Integer { min, max: Some(max) } => split_integers(min, max, desired)?,
        KeyDomain::String { min, max } => {
            if let Some(max) = max
                && min > max
            {
                return Err(SplitError::Inverted {
                    min: min.clone(),
                    max: max.clone(),
                });
            }
            vec![Position::string_range(None, max.clone())?]
        }
    };

    Ok(positions)
}

fn split_integers(min: &BigInt, max: &BigInt, desired: usize) -> Result<Vec<Position>, SplitError> {
    if min > max {
        return Err(SplitError::Inverted {
            min: min.to_string(),
            max: max.to_string(),
        });
    }

    let cardinality: BigInt = max - min + 1;
    let parts = BigInt::from(desired).min(cardinality.clone());
    let count = usize::try_from(&parts).unwrap_or(desired);

    let mut positions = Vec::with_capacity(count);
    let mut previous_upper: Option<BigInt> = None;
    for i in 1..=count {
        let upper: BigInt = min + (&cardinality * BigInt::from(i)) / &parts - 1;
        positions.push(Position::integer_range(
            previous_upper.clone(),
            Some(upper.clone()),
        )?);
        previous_upper = Some(upper);
    }

    debug!(%min, %max, ranges = positions.len(), "split integer key domain");
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::pagination::query_range::QueryRange;

    fn int_domain(min: i64, max: i64) -> KeyDomain {
        KeyDomain::Integer {
            min: BigInt::from(min),
            max: Some(BigInt::from(max)),
        }
    }

    fn encoded(positions: &[Position]) -> Vec<String> {
        positions.iter().map(|p| p.encode().unwrap()).collect()
    }

    fn owners(positions: &[Position], key: i64) -> usize {
        positions
            .iter()
            .filter(|p| {
                QueryRange::from_position(p)
                    .map(|r| r.contains(&Value::Int(key)))
                    .unwrap_or(false)
            })
            .count()
    }

    #[test]
    fn splits_one_to_hundred_in_three() {
        let positions = split(&int_domain(1, 100), 3).unwrap();
        let texts = encoded(&positions);
        assert_eq!(texts, vec!["i,,33", "i,33,66", "i,66,100"]);

        let reparsed: Vec<Position> = texts.iter().map(|t| Position::decode(t).unwrap()).collect();
        assert_eq!(reparsed, positions);
    }

    #[test]
    fn covers_every_key_exactly_once() {
        for (min, max, n) in [(1, 100, 3), (-7, 7, 4), (0, 9, 10), (5, 5, 1), (10, 1000, 7)] {
            let positions = split(&int_domain(min, max), n).unwrap();
            let cardinality = (max - min + 1) as usize;
            assert_eq!(positions.len(), n.min(cardinality), "{min}..{max}/{n}");
            for key in min..=max {
                assert_eq!(owners(&positions, key), 1, "key {key} in {min}..{max}/{n}");
            }
        }
    }

    #[test]
    fn never_returns_more_ranges_than_keys() {
        let positions = split(&int_domain(1, 3), 8).unwrap();
        assert_eq!(encoded(&positions), vec!["i,,1", "i,1,2", "i,2,3"]);
    }

    #[test]
    fn single_key_table_yields_one_range() {
        let positions = split(&int_domain(42, 42), 5).unwrap();
        assert_eq!(encoded(&positions), vec!["i,,42"]);
    }

    #[test]
    fn handles_keys_beyond_sixty_four_bits() {
        let min: BigInt = "18446744073709551616".parse().unwrap();
        let max: BigInt = "18446744073709551715".parse().unwrap();
        let positions = split(
            &KeyDomain::Integer {
                min,
                max: Some(max),
            },
            2,
        )
        .unwrap();
        assert_eq!(
            encoded(&positions),
            vec![
                "i,,18446744073709551665",
                "i,18446744073709551665,18446744073709551715"
            ]
        );
    }

    #[test]
    fn rejects_contract_violations() {
        assert_eq!(
            split(&int_domain(1, 10), 0),
            Err(SplitError::InvalidPartitions(0))
        );
        assert!(matches!(
            split(&int_domain(10, 1), 2),
            Err(SplitError::Inverted { .. })
        ));
    }

    #[test]
    fn falls_back_to_unsplit_without_usable_key() {
        assert_eq!(split(&KeyDomain::Unusable, 4).unwrap(), vec![Position::Unsplit]);

        let domain = KeyDomain::from_probe(KeyKind::Unsupported, Some(&Value::Int(1)), None).unwrap();
        assert_eq!(domain, KeyDomain::Unusable);
    }

    #[test]
    fn string_keys_are_not_divided() {
        let domain = KeyDomain::from_probe(
            KeyKind::String,
            Some(&Value::String("alice".into())),
            Some(&Value::String("zed".into())),
        )
        .unwrap();
        assert_eq!(encoded(&split(&domain, 4).unwrap()), vec!["s,,zed"]);
    }

    #[test]
    fn empty_table_gets_one_open_range() {
        let domain = KeyDomain::from_probe(KeyKind::Integer, None, None).unwrap();
        assert_eq!(encoded(&split(&domain, 4).unwrap()), vec!["i,,"]);
    }
}
