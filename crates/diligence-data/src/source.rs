//! Financial and filing data backend boundary

use crate::error::{DataError, Result};
use async_trait::async_trait;
use diligence_core::PeriodStatement;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of statement series requested from a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Annual,
    Quarterly,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataKind::Annual => "annual",
            DataKind::Quarterly => "quarterly",
        })
    }
}

/// Backend delivering per-period statements: `fetch(identifier, kind)`
///
/// Implementations wrap a third-party feed; the normalizer consumes their
/// output and never calls back into them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FinancialDataSource: Send + Sync {
    async fn fetch(&self, identifier: &str, kind: DataKind) -> Result<Vec<PeriodStatement>>;

    /// Get the source name (e.g., "sec-edgar")
    fn name(&self) -> &str;
}

/// In-memory source, used for replaying captured feeds and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticDataSource {
    series: HashMap<(String, DataKind), Vec<PeriodStatement>>,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(
        mut self,
        identifier: impl Into<String>,
        kind: DataKind,
        periods: Vec<PeriodStatement>,
    ) -> Self {
        self.series.insert((identifier.into(), kind), periods);
        self
    }

    /// Load a series from a JSON array of statements
    pub fn with_json(
        self,
        identifier: impl Into<String>,
        kind: DataKind,
        json: &str,
    ) -> Result<Self> {
        let periods: Vec<PeriodStatement> = serde_json::from_str(json)?;
        Ok(self.with_series(identifier, kind, periods))
    }
}

#[async_trait]
impl FinancialDataSource for StaticDataSource {
    async fn fetch(&self, identifier: &str, kind: DataKind) -> Result<Vec<PeriodStatement>> {
        self.series
            .get(&(identifier.to_string(), kind))
            .cloned()
            .ok_or_else(|| DataError::NotFound {
                identifier: identifier.to_string(),
                kind: kind.to_string(),
            })
    }

    fn name(&self) -> &str {
        "static"
    }
}
