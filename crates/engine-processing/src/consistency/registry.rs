use crate::{
    consistency::{
        ConsistencyCalculator, checksum::Crc32Calculator, row_match::RowMatchCalculator,
    },
    error::CalculatorError,
};
use connectors::source::RowSource;
use engine_core::retry::RetryPolicy;
use model::execution::properties::Properties;
use std::{fmt, str::FromStr};

/// Every consistency check algorithm this engine knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Crc32Match,
    DataMatch,
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::Crc32Match, Algorithm::DataMatch];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Crc32Match => "CRC32_MATCH",
            Algorithm::DataMatch => "DATA_MATCH",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Algorithm::Crc32Match => "Match CRC32 of records.",
            Algorithm::DataMatch => "Match raw data of records.",
        }
    }

    /// `CRC32_MATCH` needs a CRC32 aggregate on both sides; otherwise the
    /// exact row-match strategy is used.
    pub fn effective_for(&self, source: &dyn RowSource, target: &dyn RowSource) -> Algorithm {
        match self {
            Algorithm::Crc32Match if source.supports_crc32() && target.supports_crc32() => {
                Algorithm::Crc32Match
            }
            _ => Algorithm::DataMatch,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = CalculatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CalculatorError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Builds the calculator registered under `name`, validating `props` now
/// rather than on first use.
pub fn create_calculator(
    name: &str,
    props: &Properties,
) -> Result<Box<dyn ConsistencyCalculator>, CalculatorError> {
    calculator_for(name.parse()?, props, RetryPolicy::default())
}

pub fn calculator_for(
    algorithm: Algorithm,
    props: &Properties,
    retry: RetryPolicy,
) -> Result<Box<dyn ConsistencyCalculator>, CalculatorError> {
    Ok(match algorithm {
        Algorithm::Crc32Match => Box::new(Crc32Calculator::new().with_retry(retry)),
        Algorithm::DataMatch => {
            Box::new(RowMatchCalculator::from_properties(props)?.with_retry(retry))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::row_match::CHUNK_SIZE_KEY;
    use connectors::memory::MemorySource;

    #[test]
    fn names_resolve_case_insensitively() {
        assert_eq!("crc32_match".parse::<Algorithm>().unwrap(), Algorithm::Crc32Match);
        assert_eq!("DATA_MATCH".parse::<Algorithm>().unwrap(), Algorithm::DataMatch);
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = create_calculator("MD5_MATCH", &Properties::new()).err().unwrap();
        assert!(matches!(err, CalculatorError::UnsupportedAlgorithm(ref name) if name == "MD5_MATCH"));
    }

    #[test]
    fn properties_are_validated_at_creation() {
        let bad = Properties::new().with(CHUNK_SIZE_KEY, "0");
        assert!(create_calculator("DATA_MATCH", &bad).is_err());
        // CRC32_MATCH takes no properties.
        assert!(create_calculator("CRC32_MATCH", &bad).is_ok());

        let calculator = create_calculator("DATA_MATCH", &Properties::new()).unwrap();
        assert_eq!(calculator.algorithm(), Algorithm::DataMatch);
    }

    #[test]
    fn falls_back_to_row_match_without_crc32() {
        let mysql_like = MemorySource::new("a");
        let pg_like = MemorySource::new("b").without_crc32();
        assert_eq!(
            Algorithm::Crc32Match.effective_for(&mysql_like, &mysql_like),
            Algorithm::Crc32Match
        );
        assert_eq!(
            Algorithm::Crc32Match.effective_for(&mysql_like, &pg_like),
            Algorithm::DataMatch
        );
        assert_eq!(
            Algorithm::DataMatch.effective_for(&mysql_like, &mysql_like),
            Algorithm::DataMatch
        );
    }
}
