//! Growth projection

use crate::calculation::{Calculation, StepTrace};
use crate::error::{CalcError, Result, finite, positive_denominator};

/// Compound `base` forward by `rate` for `periods` periods
///
/// The result holds one value per projected period, excluding the base.
pub fn project_growth(base: f64, rate: f64, periods: u32) -> Result<Calculation<Vec<f64>>> {
    const OP: &str = "growth_projection";
    let base = finite(OP, "base", base)?;
    let rate = finite(OP, "rate", rate)?;
    if rate <= -1.0 {
        return Err(CalcError::InvalidInput {
            operation: OP,
            name: "rate",
            reason: format!("growth below -100% is meaningless, got {rate}"),
        });
    }

    let mut trace = StepTrace::new();
    let mut current = base;
    let mut projected = Vec::with_capacity(periods as usize);
    for period in 1..=periods {
        let next = current * (1.0 + rate);
        trace.step(format!("period {period}"), format!("{current} * (1 + {rate})"), next);
        projected.push(next);
        current = next;
    }

    Ok(trace.finish(projected, format!("Compound growth at {rate} per period")))
}

/// Compound annual growth rate between two values
pub fn cagr(start: f64, end: f64, years: f64) -> Result<Calculation<f64>> {
    const OP: &str = "cagr";
    let start = positive_denominator(OP, "start", start)?;
    let years = positive_denominator(OP, "years", years)?;
    let end = finite(OP, "end", end)?;
    if end < 0.0 {
        return Err(CalcError::InvalidInput {
            operation: OP,
            name: "end",
            reason: format!("must not be negative, got {end}"),
        });
    }

    let mut trace = StepTrace::new();
    let ratio = trace.step("ratio", format!("{end} / {start}"), end / start);
    let rate = trace.step(
        "cagr",
        format!("{ratio}^(1 / {years}) - 1"),
        ratio.powf(1.0 / years) - 1.0,
    );
    Ok(trace.finish(rate, "(end / start)^(1 / years) - 1"))
}
