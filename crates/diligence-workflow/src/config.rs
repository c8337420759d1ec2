//! Run configuration

use crate::descriptor::DEFAULT_TIME_BUDGET;
use diligence_calc::CalculatorConfig;
use diligence_claims::ClaimsConfig;
use diligence_core::{Error, Result};
use diligence_data::QualityGateConfig;
use diligence_runtime::{CacheConfig, ExecutorConfig, RetryPolicy};
use diligence_utils::env_override;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for every component of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiligenceConfig {
    pub quality: QualityGateConfig,
    pub calculator: CalculatorConfig,
    pub cache: CacheConfig,
    /// Bounded executor used for verification batches
    pub executor: ExecutorConfig,
    pub claims: ClaimsConfig,

    /// Retry policy around each agent invocation
    pub agent_retry: RetryPolicy,

    /// Time budget of agents whose descriptor sets none
    pub default_time_budget: Duration,

    /// Directory consolidated records are persisted to
    pub record_dir: Option<PathBuf>,
}

impl Default for DiligenceConfig {
    fn default() -> Self {
        Self {
            quality: QualityGateConfig::default(),
            calculator: CalculatorConfig::default(),
            cache: CacheConfig::default(),
            executor: ExecutorConfig::default(),
            claims: ClaimsConfig::default(),
            agent_retry: RetryPolicy::no_retry(),
            default_time_budget: DEFAULT_TIME_BUDGET,
            record_dir: None,
        }
    }
}

impl DiligenceConfig {
    /// Create a new configuration builder
    pub fn builder() -> DiligenceConfigBuilder {
        DiligenceConfigBuilder::default()
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `DILIGENCE_*` overrides; unparsable values are ignored with a warning
    pub fn with_env(mut self) -> Self {
        if let Some(threshold) = env_override::<u8>("DILIGENCE_QUALITY_THRESHOLD") {
            self.quality.threshold = threshold;
        }
        if let Some(max) = env_override::<usize>("DILIGENCE_MAX_CLAIMS_PER_AGENT") {
            self.claims.max_claims_per_agent = max;
        }
        if let Some(concurrency) = env_override::<usize>("DILIGENCE_MAX_CONCURRENCY") {
            self.executor.max_concurrency = concurrency;
        }
        if let Some(batch) = env_override::<usize>("DILIGENCE_BATCH_SIZE") {
            self.claims.batch_size = batch;
        }
        if let Some(secs) = env_override::<u64>("DILIGENCE_UNIT_TIMEOUT_SECS") {
            self.executor.unit_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = env_override::<PathBuf>("DILIGENCE_RECORD_DIR") {
            self.record_dir = Some(dir);
        }
        self
    }

    /// Parse a JSON document; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.quality.validate()?;
        self.calculator.validate()?;
        self.executor.validate()?;
        self.claims.validate()?;
        self.agent_retry.validate()?;
        if self.default_time_budget.is_zero() {
            return Err(Error::Configuration(
                "default agent time budget must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for DiligenceConfig
#[derive(Debug, Default)]
pub struct DiligenceConfigBuilder {
    quality_threshold: Option<u8>,
    max_claims_per_agent: Option<usize>,
    batch_size: Option<usize>,
    max_concurrency: Option<usize>,
    unit_timeout: Option<Duration>,
    unit_retry: Option<RetryPolicy>,
    agent_retry: Option<RetryPolicy>,
    default_time_budget: Option<Duration>,
    cache: Option<CacheConfig>,
    record_dir: Option<PathBuf>,
}

impl DiligenceConfigBuilder {
    /// Set the quality score at which the normalized series is preferred
    pub fn quality_threshold(mut self, threshold: u8) -> Self {
        self.quality_threshold = Some(threshold);
        self
    }

    pub fn max_claims_per_agent(mut self, max: usize) -> Self {
        self.max_claims_per_agent = Some(max);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn max_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = Some(concurrency);
        self
    }

    /// Set the per-attempt timeout of verification units
    pub fn unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = Some(timeout);
        self
    }

    pub fn unit_retry(mut self, policy: RetryPolicy) -> Self {
        self.unit_retry = Some(policy);
        self
    }

    pub fn agent_retry(mut self, policy: RetryPolicy) -> Self {
        self.agent_retry = Some(policy);
        self
    }

    pub fn default_time_budget(mut self, budget: Duration) -> Self {
        self.default_time_budget = Some(budget);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn record_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_dir = Some(dir.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<DiligenceConfig> {
        let mut config = DiligenceConfig::default();

        if let Some(threshold) = self.quality_threshold {
            config.quality.threshold = threshold;
        }
        if let Some(max) = self.max_claims_per_agent {
            config.claims.max_claims_per_agent = max;
        }
        if let Some(size) = self.batch_size {
            config.claims.batch_size = size;
        }
        if let Some(concurrency) = self.max_concurrency {
            config.executor.max_concurrency = concurrency;
        }
        if let Some(timeout) = self.unit_timeout {
            config.executor.unit_timeout = timeout;
        }
        if let Some(policy) = self.unit_retry {
            config.executor.retry = policy;
        }
        if let Some(policy) = self.agent_retry {
            config.agent_retry = policy;
        }
        if let Some(budget) = self.default_time_budget {
            config.default_time_budget = budget;
        }
        if let Some(cache) = self.cache {
            config.cache = cache;
        }
        config.record_dir = self.record_dir;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiligenceConfig::default();
        assert_eq!(config.quality.threshold, 60);
        assert_eq!(config.claims.max_claims_per_agent, 5);
        assert_eq!(config.claims.batch_size, 5);
        assert_eq!(config.executor.max_concurrency, 4);
        assert_eq!(config.agent_retry.max_attempts, 1);
        assert_eq!(config.default_time_budget, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = DiligenceConfig::builder()
            .quality_threshold(75)
            .max_claims_per_agent(3)
            .max_concurrency(8)
            .unit_timeout(Duration::from_secs(5))
            .record_dir("/tmp/records")
            .build()
            .unwrap();

        assert_eq!(config.quality.threshold, 75);
        assert_eq!(config.claims.max_claims_per_agent, 3);
        assert_eq!(config.executor.max_concurrency, 8);
        assert_eq!(config.executor.unit_timeout, Duration::from_secs(5));
        assert_eq!(config.record_dir, Some(PathBuf::from("/tmp/records")));
    }

    #[test]
    fn test_builder_rejects_invalid() {
        assert!(DiligenceConfig::builder().quality_threshold(101).build().is_err());
        assert!(DiligenceConfig::builder().batch_size(0).build().is_err());
        assert!(DiligenceConfig::builder().max_concurrency(0).build().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config = DiligenceConfig::from_json(r#"{"quality": {"threshold": 80}}"#).unwrap();
        assert_eq!(config.quality.threshold, 80);
        assert_eq!(config.quality.max_net_margin, 1.0);
        assert_eq!(config.claims.batch_size, 5);

        assert!(DiligenceConfig::from_json(r#"{"claims": {"batch_size": 0}}"#).is_err());
    }
}
