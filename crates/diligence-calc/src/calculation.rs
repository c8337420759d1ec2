//! Calculation envelope and step trace

use diligence_core::CalculationRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calculator operations, used for cache fingerprints and records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Wacc,
    Dcf,
    LboReturns,
    SynergyNpv,
    DescriptiveStats,
    ConflictResolution,
    GrowthProjection,
    Cagr,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Wacc => "wacc",
            Operation::Dcf => "dcf",
            Operation::LboReturns => "lbo_returns",
            Operation::SynergyNpv => "synergy_npv",
            Operation::DescriptiveStats => "descriptive_stats",
            Operation::ConflictResolution => "conflict_resolution",
            Operation::GrowthProjection => "growth_projection",
            Operation::Cagr => "cagr",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcStep {
    pub label: String,
    pub expression: String,
    pub value: f64,
}

impl fmt::Display for CalcStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} = {}", self.label, self.expression, self.value)
    }
}

/// Result of a calculation with its audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation<T> {
    pub result: T,
    pub methodology: String,
    pub steps: Vec<CalcStep>,
    /// Auto-corrections applied to the inputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<String>,
}

impl<T: Serialize> Calculation<T> {
    /// Serialize into the record shape carried by agent outputs
    pub fn to_record(&self, operation: Operation) -> serde_json::Result<CalculationRecord> {
        Ok(CalculationRecord {
            operation: operation.as_str().to_string(),
            result: serde_json::to_value(&self.result)?,
            methodology: self.methodology.clone(),
            steps: self
                .steps
                .iter()
                .map(ToString::to_string)
                .chain(self.corrections.iter().map(|c| format!("correction: {c}")))
                .collect(),
        })
    }
}

/// Accumulates steps while a calculation runs
#[derive(Debug, Default)]
pub(crate) struct StepTrace {
    steps: Vec<CalcStep>,
    corrections: Vec<String>,
}

impl StepTrace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a step and pass its value through
    pub(crate) fn step(
        &mut self,
        label: impl Into<String>,
        expression: impl Into<String>,
        value: f64,
    ) -> f64 {
        self.steps.push(CalcStep {
            label: label.into(),
            expression: expression.into(),
            value,
        });
        value
    }

    pub(crate) fn correct(&mut self, note: impl Into<String>) {
        self.corrections.push(note.into());
    }

    pub(crate) fn finish<T>(self, result: T, methodology: impl Into<String>) -> Calculation<T> {
        Calculation {
            result,
            methodology: methodology.into(),
            steps: self.steps,
            corrections: self.corrections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_and_record() {
        let mut trace = StepTrace::new();
        let a = trace.step("a", "1 + 2", 3.0);
        trace.step("b", format!("{a} * 2"), a * 2.0);
        trace.correct("input clamped");
        let calc = trace.finish(6.0_f64, "doubling");

        assert_eq!(calc.steps.len(), 2);
        assert_eq!(calc.steps[1].to_string(), "b: 3 * 2 = 6");

        let record = calc.to_record(Operation::GrowthProjection).unwrap();
        assert_eq!(record.operation, "growth_projection");
        assert_eq!(record.result, serde_json::json!(6.0));
        assert_eq!(record.steps.last().unwrap(), "correction: input clamped");
    }
}
