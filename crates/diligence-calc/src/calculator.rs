//! Configured calculator facade

use crate::calculation::Calculation;
use crate::error::{CalcError, Result};
use crate::growth;
use crate::stats::{self, ConflictStrategy, DescriptiveStats};
use crate::valuation::{
    self, DcfInputs, DcfOutput, LboInputs, LboOutput, SynergyInputs, SynergyOutput, WaccInputs,
    WaccOutput,
};
use serde::{Deserialize, Serialize};

/// Calculator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    /// Minimum gap kept between WACC and terminal growth
    pub min_wacc_growth_spread: f64,
    /// Strategy for combining conflicting values of one fact
    pub conflict_strategy: ConflictStrategy,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            min_wacc_growth_spread: 0.01,
            conflict_strategy: ConflictStrategy::Median,
        }
    }
}

impl CalculatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_wacc_growth_spread.is_finite() && self.min_wacc_growth_spread > 0.0) {
            return Err(CalcError::InvalidInput {
                operation: "config",
                name: "min_wacc_growth_spread",
                reason: format!("must be positive, got {}", self.min_wacc_growth_spread),
            });
        }
        Ok(())
    }
}

/// Stateless calculator bound to a configuration
///
/// Every method is pure; two consumers holding equal configurations get
/// byte-identical results for equal inputs.
#[derive(Debug, Clone, Default)]
pub struct Calculator {
    config: CalculatorConfig,
}

impl Calculator {
    pub fn new(config: CalculatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    pub fn wacc(&self, inputs: &WaccInputs) -> Result<Calculation<WaccOutput>> {
        valuation::wacc(inputs)
    }

    pub fn dcf(&self, inputs: &DcfInputs) -> Result<Calculation<DcfOutput>> {
        valuation::dcf(inputs, self.config.min_wacc_growth_spread)
    }

    pub fn lbo_returns(&self, inputs: &LboInputs) -> Result<Calculation<LboOutput>> {
        valuation::lbo_returns(inputs)
    }

    pub fn synergy_npv(&self, inputs: &SynergyInputs) -> Result<Calculation<SynergyOutput>> {
        valuation::synergy_npv(inputs)
    }

    pub fn descriptive_stats(&self, values: &[f64]) -> Result<Calculation<DescriptiveStats>> {
        stats::descriptive_stats(values)
    }

    /// Resolve conflicting values with the configured strategy
    pub fn resolve_conflict(&self, values: &[f64]) -> Result<Calculation<f64>> {
        stats::resolve_conflict(values, self.config.conflict_strategy)
    }

    pub fn project_growth(
        &self,
        base: f64,
        rate: f64,
        periods: u32,
    ) -> Result<Calculation<Vec<f64>>> {
        growth::project_growth(base, rate, periods)
    }

    pub fn cagr(&self, start: f64, end: f64, years: f64) -> Result<Calculation<f64>> {
        growth::cagr(start, end, years)
    }
}
