use crate::{
    error::SettingsError,
    settings::validated::{ValidatedSettings, ValidatedSettingsBuilder},
};
use model::scan::request::QueryStrategy;
use serde::Deserialize;
use std::collections::HashMap;

/// Settings as written by an operator, before validation.
///
/// ```json
/// { "batch_size": 500, "algorithm": { "type": "DATA_MATCH", "props": { "chunk-size": "200" } } }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawSettings {
    pub batch_size: Option<usize>,
    pub worker_count: Option<usize>,
    pub partitions: Option<usize>,
    pub query_strategy: Option<RawQueryStrategy>,
    pub mailbox_capacity: Option<usize>,
    pub algorithm: Option<RawAlgorithm>,
}

#[derive(Debug, Deserialize)]
pub struct RawAlgorithm {
    #[serde(rename = "type")]
    pub name: String,
    #[serde(default)]
    pub props: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawQueryStrategy {
    Range,
    Ordered,
}

impl From<RawQueryStrategy> for QueryStrategy {
    fn from(raw: RawQueryStrategy) -> Self {
        match raw {
            RawQueryStrategy::Range => QueryStrategy::RangeQuery,
            RawQueryStrategy::Ordered => QueryStrategy::OrderedQuery,
        }
    }
}

impl RawSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn into_builder(self) -> ValidatedSettingsBuilder {
        let mut builder = ValidatedSettingsBuilder::new();
        if let Some(v) = self.batch_size {
            builder = builder.batch_size(v);
        }
        if let Some(v) = self.worker_count {
            builder = builder.worker_count(v);
        }
        if let Some(v) = self.partitions {
            builder = builder.partitions(v);
        }
        if let Some(v) = self.query_strategy {
            builder = builder.query_strategy(v.into());
        }
        if let Some(v) = self.mailbox_capacity {
            builder = builder.mailbox_capacity(v);
        }
        if let Some(algorithm) = self.algorithm {
            builder = builder
                .algorithm(algorithm.name)
                .algorithm_props(algorithm.props.into_iter().collect());
        }
        builder
    }

    pub fn validate(self) -> Result<ValidatedSettings, SettingsError> {
        self.into_builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_processing::consistency::Algorithm;

    #[test]
    fn parses_and_validates() {
        let settings = RawSettings::from_json(
            r#"{
                "batch_size": 250,
                "partitions": 4,
                "query_strategy": "ordered",
                "algorithm": { "type": "DATA_MATCH", "props": { "chunk-size": "100" } }
            }"#,
        )
        .unwrap()
        .validate()
        .unwrap();

        assert_eq!(settings.batch_size(), 250);
        assert_eq!(settings.partitions(), 4);
        assert_eq!(settings.query_strategy(), QueryStrategy::OrderedQuery);
        assert_eq!(settings.algorithm(), Algorithm::DataMatch);
        assert_eq!(settings.algorithm_props().get("chunk-size"), Some("100"));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let settings = RawSettings::from_json("{}").unwrap().validate().unwrap();
        assert_eq!(settings.batch_size(), 1000);
    }

    #[test]
    fn unknown_keys_are_malformed() {
        let err = RawSettings::from_json(r#"{ "bacth_size": 10 }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Malformed(_)));
    }

    #[test]
    fn invalid_chunk_size_fails_validation() {
        let err = RawSettings::from_json(
            r#"{ "algorithm": { "type": "DATA_MATCH", "props": { "chunk-size": "-5" } } }"#,
        )
        .unwrap()
        .validate()
        .unwrap_err();
        assert!(matches!(err, SettingsError::Algorithm(_)));
    }
}
