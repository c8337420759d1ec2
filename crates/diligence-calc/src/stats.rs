//! Descriptive statistics and numeric conflict resolution

use crate::calculation::{Calculation, StepTrace};
use crate::error::{CalcError, Result, finite};
use serde::{Deserialize, Serialize};

/// Summary statistics of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

/// How conflicting numeric values are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    Mean,
    #[default]
    Median,
}

fn checked_sorted(operation: &'static str, values: &[f64]) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(CalcError::EmptyInput { operation });
    }
    let mut sorted = values
        .iter()
        .map(|v| finite(operation, "values", *v))
        .collect::<Result<Vec<f64>>>()?;
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Count, mean, median, min, max, and population standard deviation
pub fn descriptive_stats(values: &[f64]) -> Result<Calculation<DescriptiveStats>> {
    const OP: &str = "descriptive_stats";
    let sorted = checked_sorted(OP, values)?;
    let mut trace = StepTrace::new();

    let count = sorted.len();
    let n = count as f64;
    // Summed in input order so the trace matches the caller's sequence.
    let sum: f64 = values.iter().sum();
    trace.step("sum", format!("sum of {count} values"), sum);
    let mean = trace.step("mean", format!("{sum} / {count}"), sum / n);
    let median = trace.step("median", "middle of sorted values", median_of_sorted(&sorted));
    let min = trace.step("min", "smallest value", sorted[0]);
    let max = trace.step("max", "largest value", sorted[count - 1]);
    let variance: f64 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    trace.step("variance", format!("sum((x - {mean})^2) / {count}"), variance);
    let std_dev = trace.step("std_dev", format!("sqrt({variance})"), variance.sqrt());

    Ok(trace.finish(
        DescriptiveStats {
            count,
            mean,
            median,
            min,
            max,
            std_dev,
        },
        "Population descriptive statistics",
    ))
}

/// Combine conflicting values for one fact into a single resolved value
pub fn resolve_conflict(values: &[f64], strategy: ConflictStrategy) -> Result<Calculation<f64>> {
    const OP: &str = "conflict_resolution";
    let sorted = checked_sorted(OP, values)?;
    let mut trace = StepTrace::new();

    let rendered = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    trace.step("inputs", format!("[{rendered}]"), values.len() as f64);

    let (resolved, methodology) = match strategy {
        ConflictStrategy::Mean => {
            let sum: f64 = values.iter().sum();
            let mean = trace.step(
                "mean",
                format!("{sum} / {}", values.len()),
                sum / values.len() as f64,
            );
            (mean, "Arithmetic mean of conflicting values")
        }
        ConflictStrategy::Median => {
            let median = trace.step("median", "middle of sorted values", median_of_sorted(&sorted));
            (median, "Median of conflicting values")
        }
    };
    let (low, high) = (sorted[0], sorted[sorted.len() - 1]);
    trace.step("spread", format!("{high} - {low}"), high - low);

    Ok(trace.finish(resolved, methodology))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptive_stats() {
        let calc = descriptive_stats(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        let stats = calc.result;
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!((stats.std_dev - 1.25_f64.sqrt()).abs() < 1e-12);
        assert_eq!(calc.steps.first().unwrap().label, "sum");
    }

    #[test]
    fn test_empty_and_non_finite() {
        assert_eq!(
            descriptive_stats(&[]).unwrap_err(),
            CalcError::EmptyInput {
                operation: "descriptive_stats"
            }
        );
        assert!(matches!(
            descriptive_stats(&[1.0, f64::INFINITY]),
            Err(CalcError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_two_way_conflict_resolves_to_midpoint() {
        let median = resolve_conflict(&[100.0, 120.0], ConflictStrategy::Median).unwrap();
        let mean = resolve_conflict(&[100.0, 120.0], ConflictStrategy::Mean).unwrap();
        assert_eq!(median.result, 110.0);
        assert_eq!(mean.result, 110.0);
        assert_eq!(median.steps[0].expression, "[100, 120]");
        assert_eq!(median.methodology, "Median of conflicting values");
    }

    #[test]
    fn test_median_resists_outlier() {
        let calc = resolve_conflict(&[100.0, 105.0, 1_000.0], ConflictStrategy::Median).unwrap();
        assert_eq!(calc.result, 105.0);
    }

    #[test]
    fn test_deterministic_output() {
        let a = descriptive_stats(&[3.3, 1.1, 2.2]).unwrap();
        let b = descriptive_stats(&[3.3, 1.1, 2.2]).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
