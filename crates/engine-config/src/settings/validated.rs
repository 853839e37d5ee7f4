use crate::error::SettingsError;
use engine_core::retry::RetryPolicy;
use engine_processing::{
    consistency::{Algorithm, ConsistencyCalculator, registry::calculator_for},
    scan::config::ScanConfig,
};
use model::{execution::properties::Properties, scan::request::QueryStrategy};
use tracing::debug;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Immutable, validated configuration of one pipeline job.
#[derive(Debug, Clone)]
pub struct ValidatedSettings {
    /// Rows per page and per checkpoint.
    batch_size: usize,
    /// Upper bound of concurrently running scan workers.
    worker_count: usize,
    /// Desired number of ranges per table.
    partitions: usize,
    query_strategy: QueryStrategy,
    algorithm: Algorithm,
    algorithm_props: Properties,
    retry: RetryPolicy,
    /// Capacity of the progress tracker's mailbox.
    mailbox_capacity: usize,
}

impl Default for ValidatedSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            partitions: 1,
            query_strategy: QueryStrategy::default(),
            algorithm: Algorithm::DataMatch,
            algorithm_props: Properties::new(),
            retry: RetryPolicy::for_database(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl ValidatedSettings {
    pub fn builder() -> ValidatedSettingsBuilder {
        ValidatedSettingsBuilder::default()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn query_strategy(&self) -> QueryStrategy {
        self.query_strategy
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn algorithm_props(&self) -> &Properties {
        &self.algorithm_props
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_capacity
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig::default()
            .with_batch_size(self.batch_size)
            .with_retry(self.retry.clone())
    }

    /// Calculator for `algorithm` using the configured properties. The
    /// properties were already accepted by [`ValidatedSettingsBuilder::build`],
    /// but a fallback algorithm may read different keys.
    pub fn calculator(
        &self,
        algorithm: Algorithm,
    ) -> Result<Box<dyn ConsistencyCalculator>, SettingsError> {
        Ok(calculator_for(
            algorithm,
            &self.algorithm_props,
            self.retry.clone(),
        )?)
    }
}

#[derive(Debug, Default)]
pub struct ValidatedSettingsBuilder {
    batch_size: Option<usize>,
    worker_count: Option<usize>,
    partitions: Option<usize>,
    query_strategy: Option<QueryStrategy>,
    algorithm: Option<String>,
    algorithm_props: Properties,
    retry: Option<RetryPolicy>,
    mailbox_capacity: Option<usize>,
}

impl ValidatedSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = Some(worker_count);
        self
    }

    pub fn partitions(mut self, partitions: usize) -> Self {
        self.partitions = Some(partitions);
        self
    }

    pub fn query_strategy(mut self, strategy: QueryStrategy) -> Self {
        self.query_strategy = Some(strategy);
        self
    }

    pub fn algorithm(mut self, name: impl Into<String>) -> Self {
        self.algorithm = Some(name.into());
        self
    }

    pub fn algorithm_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.algorithm_props.insert(key, value);
        self
    }

    pub fn algorithm_props(mut self, props: Properties) -> Self {
        self.algorithm_props = props;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }

    /// Validates every value and constructs the configured calculator once so
    /// that bad algorithm properties fail here instead of mid-job.
    pub fn build(self) -> Result<ValidatedSettings, SettingsError> {
        let defaults = ValidatedSettings::default();

        let batch_size = at_least_one("batch_size", self.batch_size, defaults.batch_size)?;
        let worker_count = at_least_one("worker_count", self.worker_count, defaults.worker_count)?;
        let partitions = at_least_one("partitions", self.partitions, defaults.partitions)?;
        let mailbox_capacity = at_least_one(
            "mailbox_capacity",
            self.mailbox_capacity,
            defaults.mailbox_capacity,
        )?;

        let algorithm = match self.algorithm.as_deref() {
            Some(name) => name.parse::<Algorithm>()?,
            None => defaults.algorithm,
        };
        let retry = self.retry.unwrap_or(defaults.retry);
        calculator_for(algorithm, &self.algorithm_props, retry.clone())?;

        debug!(
            batch_size,
            worker_count,
            partitions,
            algorithm = %algorithm,
            "Validated job settings"
        );

        Ok(ValidatedSettings {
            batch_size,
            worker_count,
            partitions,
            query_strategy: self.query_strategy.unwrap_or_default(),
            algorithm,
            algorithm_props: self.algorithm_props,
            retry,
            mailbox_capacity,
        })
    }
}

fn at_least_one(
    name: &'static str,
    value: Option<usize>,
    default: usize,
) -> Result<usize, SettingsError> {
    match value {
        Some(0) => Err(SettingsError::InvalidValue {
            name,
            reason: "must be at least 1".into(),
        }),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_processing::error::CalculatorError;

    #[test]
    fn defaults_are_valid() {
        let settings = ValidatedSettingsBuilder::new().build().unwrap();
        assert_eq!(settings.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(settings.worker_count(), DEFAULT_WORKER_COUNT);
        assert_eq!(settings.partitions(), 1);
        assert_eq!(settings.algorithm(), Algorithm::DataMatch);
        assert_eq!(settings.query_strategy(), QueryStrategy::RangeQuery);
    }

    #[test]
    fn builder_overrides() {
        let settings = ValidatedSettings::builder()
            .batch_size(500)
            .worker_count(2)
            .partitions(8)
            .query_strategy(QueryStrategy::OrderedQuery)
            .algorithm("crc32_match")
            .build()
            .unwrap();

        assert_eq!(settings.batch_size(), 500);
        assert_eq!(settings.scan_config().batch_size, 500);
        assert_eq!(settings.worker_count(), 2);
        assert_eq!(settings.partitions(), 8);
        assert_eq!(settings.algorithm(), Algorithm::Crc32Match);
    }

    #[test]
    fn zero_values_are_rejected() {
        let err = ValidatedSettings::builder().batch_size(0).build().unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { name: "batch_size", .. }));

        let err = ValidatedSettings::builder().worker_count(0).build().unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { name: "worker_count", .. }));

        let err = ValidatedSettings::builder().partitions(0).build().unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { name: "partitions", .. }));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let err = ValidatedSettings::builder().algorithm("MD5_MATCH").build().unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Algorithm(CalculatorError::UnsupportedAlgorithm(ref name)) if name == "MD5_MATCH"
        ));
    }

    #[test]
    fn algorithm_properties_are_checked_eagerly() {
        let err = ValidatedSettings::builder()
            .algorithm("DATA_MATCH")
            .algorithm_property("chunk-size", "0")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Algorithm(CalculatorError::InvalidParameter { .. })
        ));

        let settings = ValidatedSettings::builder()
            .algorithm_property("chunk-size", "64")
            .build()
            .unwrap();
        assert_eq!(settings.algorithm_props().get("chunk-size"), Some("64"));
        assert!(settings.calculator(Algorithm::DataMatch).is_ok());
    }
}
