//! Calculator memoised in the calculation cache
//!
//! Safe to share across concurrent workers: the calculator is pure, so a
//! cached value is always the value a fresh call would produce.

use crate::cache::{Fingerprint, TtlCache};
use diligence_calc::{
    Calculation, Calculator, DcfInputs, DcfOutput, DescriptiveStats, LboInputs, LboOutput,
    Operation, SynergyInputs, SynergyOutput, WaccInputs, WaccOutput,
};
use diligence_core::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

#[derive(Clone)]
pub struct CachedCalculator {
    calculator: Calculator,
    cache: TtlCache<serde_json::Value>,
}

impl CachedCalculator {
    pub fn new(calculator: Calculator, cache: TtlCache<serde_json::Value>) -> Self {
        Self { calculator, cache }
    }

    pub fn calculator(&self) -> &Calculator {
        &self.calculator
    }

    pub fn cache(&self) -> &TtlCache<serde_json::Value> {
        &self.cache
    }

    pub async fn wacc(&self, inputs: &WaccInputs) -> Result<Calculation<WaccOutput>> {
        self.memoised(Operation::Wacc, inputs, || self.calculator.wacc(inputs))
            .await
    }

    pub async fn dcf(&self, inputs: &DcfInputs) -> Result<Calculation<DcfOutput>> {
        // The spread changes the result, so it is part of the key
        let key = json!({
            "inputs": inputs,
            "min_spread": self.calculator.config().min_wacc_growth_spread,
        });
        self.memoised(Operation::Dcf, &key, || self.calculator.dcf(inputs))
            .await
    }

    pub async fn lbo_returns(&self, inputs: &LboInputs) -> Result<Calculation<LboOutput>> {
        self.memoised(Operation::LboReturns, inputs, || {
            self.calculator.lbo_returns(inputs)
        })
        .await
    }

    pub async fn synergy_npv(&self, inputs: &SynergyInputs) -> Result<Calculation<SynergyOutput>> {
        self.memoised(Operation::SynergyNpv, inputs, || {
            self.calculator.synergy_npv(inputs)
        })
        .await
    }

    pub async fn descriptive_stats(&self, values: &[f64]) -> Result<Calculation<DescriptiveStats>> {
        self.memoised(Operation::DescriptiveStats, &values, || {
            self.calculator.descriptive_stats(values)
        })
        .await
    }

    pub async fn resolve_conflict(&self, values: &[f64]) -> Result<Calculation<f64>> {
        let key = json!({
            "values": values,
            "strategy": self.calculator.config().conflict_strategy,
        });
        self.memoised(Operation::ConflictResolution, &key, || {
            self.calculator.resolve_conflict(values)
        })
        .await
    }

    pub async fn project_growth(
        &self,
        base: f64,
        rate: f64,
        periods: u32,
    ) -> Result<Calculation<Vec<f64>>> {
        self.memoised(Operation::GrowthProjection, &(base, rate, periods), || {
            self.calculator.project_growth(base, rate, periods)
        })
        .await
    }

    pub async fn cagr(&self, start: f64, end: f64, years: f64) -> Result<Calculation<f64>> {
        self.memoised(Operation::Cagr, &(start, end, years), || {
            self.calculator.cagr(start, end, years)
        })
        .await
    }

    async fn memoised<K, T, F>(
        &self,
        operation: Operation,
        key: &K,
        compute: F,
    ) -> Result<Calculation<T>>
    where
        K: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> diligence_calc::Result<Calculation<T>>,
    {
        let fingerprint = Fingerprint::of(operation.as_str(), &key)?;
        let value = self
            .cache
            .get_or_compute(fingerprint, || async move {
                let calculation = compute()?;
                Ok::<_, diligence_core::Error>(serde_json::to_value(&calculation)?)
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cached() -> CachedCalculator {
        CachedCalculator::new(
            Calculator::default(),
            TtlCache::new("calculation", Duration::from_secs(60)),
        )
    }

    #[tokio::test]
    async fn test_cached_matches_direct() {
        let calc = cached();
        let inputs = WaccInputs {
            equity_value: 600.0,
            debt_value: 400.0,
            risk_free_rate: 0.04,
            beta: 1.1,
            equity_risk_premium: 0.055,
            pre_tax_cost_of_debt: 0.06,
            tax_rate: 0.25,
        };

        let direct = calc.calculator().wacc(&inputs).unwrap();
        let first = calc.wacc(&inputs).await.unwrap();
        let second = calc.wacc(&inputs).await.unwrap();

        assert_eq!(first, direct);
        assert_eq!(second, direct);
        let stats = calc.cache().stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn test_errors_propagate_uncached() {
        let calc = cached();
        assert!(calc.descriptive_stats(&[]).await.is_err());
        assert!(calc.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_conflict_resolution_cached() {
        let calc = cached();
        let first = calc.resolve_conflict(&[100.0, 120.0]).await.unwrap();
        let second = calc.resolve_conflict(&[100.0, 120.0]).await.unwrap();
        assert_eq!(first.result, 110.0);
        assert_eq!(first, second);
        assert_eq!(calc.cache().len().await, 1);
    }
}
