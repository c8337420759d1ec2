//! Valuation primitives: WACC, DCF, LBO returns, and synergy NPV

use crate::calculation::{Calculation, StepTrace};
use crate::error::{CalcError, Result, finite, positive_denominator};
use serde::{Deserialize, Serialize};

// =========== WACC ===========

/// Capital structure and CAPM inputs for WACC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaccInputs {
    pub equity_value: f64,
    pub debt_value: f64,
    pub risk_free_rate: f64,
    pub beta: f64,
    pub equity_risk_premium: f64,
    pub pre_tax_cost_of_debt: f64,
    pub tax_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaccOutput {
    pub wacc: f64,
    pub cost_of_equity: f64,
    pub after_tax_cost_of_debt: f64,
    pub equity_weight: f64,
    pub debt_weight: f64,
}

/// Weighted average cost of capital with CAPM cost of equity
pub fn wacc(inputs: &WaccInputs) -> Result<Calculation<WaccOutput>> {
    const OP: &str = "wacc";
    let equity = finite(OP, "equity_value", inputs.equity_value)?;
    let debt = finite(OP, "debt_value", inputs.debt_value)?;
    let rf = finite(OP, "risk_free_rate", inputs.risk_free_rate)?;
    let beta = finite(OP, "beta", inputs.beta)?;
    let erp = finite(OP, "equity_risk_premium", inputs.equity_risk_premium)?;
    let kd = finite(OP, "pre_tax_cost_of_debt", inputs.pre_tax_cost_of_debt)?;
    let tax = finite(OP, "tax_rate", inputs.tax_rate)?;
    if !(0.0..=1.0).contains(&tax) {
        return Err(CalcError::InvalidInput {
            operation: OP,
            name: "tax_rate",
            reason: format!("must be within [0, 1], got {tax}"),
        });
    }

    let mut trace = StepTrace::new();
    let total = positive_denominator(
        OP,
        "total_capital",
        trace.step("total_capital", format!("{equity} + {debt}"), equity + debt),
    )?;
    let we = trace.step("equity_weight", format!("{equity} / {total}"), equity / total);
    let wd = trace.step("debt_weight", format!("{debt} / {total}"), debt / total);
    let ke = trace.step(
        "cost_of_equity",
        format!("{rf} + {beta} * {erp}"),
        rf + beta * erp,
    );
    let kd_after = trace.step(
        "after_tax_cost_of_debt",
        format!("{kd} * (1 - {tax})"),
        kd * (1.0 - tax),
    );
    let wacc = trace.step(
        "wacc",
        format!("{we} * {ke} + {wd} * {kd_after}"),
        we * ke + wd * kd_after,
    );

    Ok(trace.finish(
        WaccOutput {
            wacc,
            cost_of_equity: ke,
            after_tax_cost_of_debt: kd_after,
            equity_weight: we,
            debt_weight: wd,
        },
        "WACC = E/V * (Rf + beta * ERP) + D/V * Kd * (1 - t)",
    ))
}

// =========== DCF ===========

/// Inputs for a discounted-cash-flow valuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfInputs {
    /// Free cash flow of the last actual year
    pub base_free_cash_flow: f64,
    /// One growth rate per explicit forecast year
    pub growth_rates: Vec<f64>,
    pub wacc: f64,
    pub terminal_growth: f64,
    /// Subtracted from enterprise value to reach equity value
    #[serde(default)]
    pub net_debt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfOutput {
    pub enterprise_value: f64,
    pub equity_value: f64,
    pub pv_explicit: f64,
    pub terminal_value: f64,
    pub pv_terminal: f64,
    /// Terminal growth actually used, after any correction
    pub terminal_growth_used: f64,
    pub projected_cash_flows: Vec<f64>,
}

/// Gordon-growth DCF
///
/// When `wacc - terminal_growth` falls below `min_spread`, terminal growth is
/// lowered to `wacc - min_spread` and the correction is recorded.
pub fn dcf(inputs: &DcfInputs, min_spread: f64) -> Result<Calculation<DcfOutput>> {
    const OP: &str = "dcf";
    let base = finite(OP, "base_free_cash_flow", inputs.base_free_cash_flow)?;
    let wacc = positive_denominator(OP, "wacc", inputs.wacc)?;
    let requested_g = finite(OP, "terminal_growth", inputs.terminal_growth)?;
    let net_debt = finite(OP, "net_debt", inputs.net_debt)?;
    let min_spread = positive_denominator(OP, "min_spread", min_spread)?;
    if inputs.growth_rates.is_empty() {
        return Err(CalcError::InvalidInput {
            operation: OP,
            name: "growth_rates",
            reason: "at least one forecast year is required".to_string(),
        });
    }

    let mut trace = StepTrace::new();

    let mut g = requested_g;
    if wacc - g < min_spread {
        g = wacc - min_spread;
        trace.correct(format!(
            "terminal growth {requested_g} lowered to {g} to keep WACC {wacc} at least {min_spread} above it"
        ));
    }

    let mut fcf = base;
    let mut projected = Vec::with_capacity(inputs.growth_rates.len());
    let mut pv_explicit = 0.0;
    for (i, rate) in inputs.growth_rates.iter().enumerate() {
        let rate = finite(OP, "growth_rates", *rate)?;
        let year = i + 1;
        fcf = trace.step(
            format!("fcf year {year}"),
            format!("{fcf} * (1 + {rate})"),
            fcf * (1.0 + rate),
        );
        let pv = trace.step(
            format!("pv year {year}"),
            format!("{fcf} / (1 + {wacc})^{year}"),
            fcf / (1.0 + wacc).powi(year as i32),
        );
        projected.push(fcf);
        pv_explicit += pv;
    }
    trace.step("pv_explicit", "sum of discounted forecast cash flows", pv_explicit);

    let years = inputs.growth_rates.len();
    let spread = wacc - g;
    let terminal_value = trace.step(
        "terminal_value",
        format!("{fcf} * (1 + {g}) / ({wacc} - {g})"),
        fcf * (1.0 + g) / spread,
    );
    let pv_terminal = trace.step(
        "pv_terminal",
        format!("{terminal_value} / (1 + {wacc})^{years}"),
        terminal_value / (1.0 + wacc).powi(years as i32),
    );
    let enterprise_value = trace.step(
        "enterprise_value",
        format!("{pv_explicit} + {pv_terminal}"),
        pv_explicit + pv_terminal,
    );
    let equity_value = trace.step(
        "equity_value",
        format!("{enterprise_value} - {net_debt}"),
        enterprise_value - net_debt,
    );

    Ok(trace.finish(
        DcfOutput {
            enterprise_value,
            equity_value,
            pv_explicit,
            terminal_value,
            pv_terminal,
            terminal_growth_used: g,
            projected_cash_flows: projected,
        },
        "Explicit-period DCF with Gordon growth terminal value",
    ))
}

// =========== LBO ===========

/// Entry and exit assumptions for a leveraged buyout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LboInputs {
    pub entry_enterprise_value: f64,
    pub entry_debt: f64,
    pub exit_ebitda: f64,
    pub exit_multiple: f64,
    pub exit_net_debt: f64,
    pub holding_years: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LboOutput {
    pub entry_equity: f64,
    pub exit_enterprise_value: f64,
    pub exit_equity: f64,
    /// Multiple on invested capital
    pub moic: f64,
    pub irr: f64,
}

/// Sponsor equity returns: MOIC and IRR
pub fn lbo_returns(inputs: &LboInputs) -> Result<Calculation<LboOutput>> {
    const OP: &str = "lbo_returns";
    let entry_ev = finite(OP, "entry_enterprise_value", inputs.entry_enterprise_value)?;
    let entry_debt = finite(OP, "entry_debt", inputs.entry_debt)?;
    let exit_ebitda = finite(OP, "exit_ebitda", inputs.exit_ebitda)?;
    let exit_multiple = finite(OP, "exit_multiple", inputs.exit_multiple)?;
    let exit_net_debt = finite(OP, "exit_net_debt", inputs.exit_net_debt)?;
    let years = positive_denominator(OP, "holding_years", inputs.holding_years)?;

    let mut trace = StepTrace::new();
    let entry_equity = positive_denominator(
        OP,
        "entry_equity",
        trace.step("entry_equity", format!("{entry_ev} - {entry_debt}"), entry_ev - entry_debt),
    )?;
    let exit_ev = trace.step(
        "exit_enterprise_value",
        format!("{exit_ebitda} * {exit_multiple}"),
        exit_ebitda * exit_multiple,
    );
    let exit_equity = trace.step(
        "exit_equity",
        format!("{exit_ev} - {exit_net_debt}"),
        exit_ev - exit_net_debt,
    );
    let moic = trace.step(
        "moic",
        format!("{exit_equity} / {entry_equity}"),
        exit_equity / entry_equity,
    );
    let irr = if moic > 0.0 {
        trace.step("irr", format!("{moic}^(1 / {years}) - 1"), moic.powf(1.0 / years) - 1.0)
    } else {
        trace.correct("exit equity is not positive; IRR floored at -100%");
        trace.step("irr", "total loss", -1.0)
    };

    Ok(trace.finish(
        LboOutput {
            entry_equity,
            exit_enterprise_value: exit_ev,
            exit_equity,
            moic,
            irr,
        },
        "MOIC = exit equity / entry equity; IRR = MOIC^(1 / years) - 1",
    ))
}

// =========== Synergy NPV ===========

/// Synergy case for a combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynergyInputs {
    /// Annual synergies once fully realized
    pub run_rate_synergies: f64,
    /// Fraction realized per year; the last entry persists. Empty means 100%.
    #[serde(default)]
    pub phase_in: Vec<f64>,
    /// One-off integration cost per year; missing years cost nothing
    #[serde(default)]
    pub integration_costs: Vec<f64>,
    pub discount_rate: f64,
    pub horizon_years: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynergyYear {
    pub year: u32,
    pub realized: f64,
    pub cost: f64,
    pub net: f64,
    pub present_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynergyOutput {
    pub npv: f64,
    pub years: Vec<SynergyYear>,
}

/// Net present value of phased synergies less integration costs
pub fn synergy_npv(inputs: &SynergyInputs) -> Result<Calculation<SynergyOutput>> {
    const OP: &str = "synergy_npv";
    let run_rate = finite(OP, "run_rate_synergies", inputs.run_rate_synergies)?;
    let rate = finite(OP, "discount_rate", inputs.discount_rate)?;
    let base = positive_denominator(OP, "1 + discount_rate", 1.0 + rate)?;
    if inputs.horizon_years == 0 {
        return Err(CalcError::InvalidInput {
            operation: OP,
            name: "horizon_years",
            reason: "must be at least one year".to_string(),
        });
    }

    let mut trace = StepTrace::new();
    let mut years = Vec::with_capacity(inputs.horizon_years as usize);
    let mut npv = 0.0;
    for year in 1..=inputs.horizon_years {
        let idx = (year - 1) as usize;
        let phase = match inputs.phase_in.get(idx).or(inputs.phase_in.last()) {
            Some(p) => finite(OP, "phase_in", *p)?,
            None => 1.0,
        };
        let cost = match inputs.integration_costs.get(idx) {
            Some(c) => finite(OP, "integration_costs", *c)?,
            None => 0.0,
        };
        let realized = run_rate * phase;
        let net = trace.step(
            format!("net year {year}"),
            format!("{run_rate} * {phase} - {cost}"),
            realized - cost,
        );
        let present_value = trace.step(
            format!("pv year {year}"),
            format!("{net} / {base}^{year}"),
            net / base.powi(year as i32),
        );
        npv += present_value;
        years.push(SynergyYear {
            year,
            realized,
            cost,
            net,
            present_value,
        });
    }
    trace.step("npv", "sum of discounted net synergies", npv);

    Ok(trace.finish(
        SynergyOutput { npv, years },
        "NPV of run-rate synergies x phase-in less integration costs",
    ))
}
