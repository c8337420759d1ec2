//! Configuration management utilities

use crate::LogFormat;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Base application configuration shared by every binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "diligence-rs".to_string(),
            environment: "development".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Apply `DILIGENCE_ENV` and `DILIGENCE_LOG_FORMAT` from the environment
    pub fn with_env(mut self) -> Self {
        if let Ok(env) = std::env::var("DILIGENCE_ENV") {
            self.environment = env;
        }
        if let Ok(format) = std::env::var("DILIGENCE_LOG_FORMAT") {
            if format.eq_ignore_ascii_case("json") {
                self.log_format = LogFormat::Json;
            }
        }
        self
    }
}

/// Read and parse an environment variable, returning `None` when it is
/// unset or does not parse
pub fn env_override<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                variable = name,
                value = %raw,
                "ignoring unparsable environment override"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.app_name, "diligence-rs");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_env_override_missing() {
        let value: Option<u32> = env_override("DILIGENCE_TEST_SURELY_UNSET_VARIABLE");
        assert!(value.is_none());
    }
}
