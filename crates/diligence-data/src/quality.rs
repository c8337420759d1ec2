//! Quality gate and normalizer
//!
//! Each period is checked for plausibility. Failing periods are left in the
//! raw array, dropped from the normalized array, and logged as exactly one
//! excluding [`AdjustmentRecord`]. Surviving periods may still be adjusted
//! (non-recurring items are stripped from net income); those adjustments are
//! recorded too. The gate never fails: when nothing survives, the raw array
//! is returned unchanged with a zero score and a warning.

use crate::error::{DataError, Result};
use diligence_core::PeriodStatement;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Quality gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGateConfig {
    /// Lowest plausible net margin (-1.0 = -100%)
    pub min_net_margin: f64,
    /// Highest plausible net margin
    pub max_net_margin: f64,
    /// Score at or above which consumers use the normalized array
    pub threshold: u8,
    /// Remove reported non-recurring items from normalized net income
    pub strip_non_recurring: bool,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_net_margin: -1.0,
            max_net_margin: 1.0,
            threshold: 60,
            strip_non_recurring: true,
        }
    }
}

impl QualityGateConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_net_margin.is_finite() && self.max_net_margin.is_finite())
            || self.min_net_margin >= self.max_net_margin
        {
            return Err(DataError::Config(format!(
                "net margin bounds must be finite and ordered, got [{}, {}]",
                self.min_net_margin, self.max_net_margin
            )));
        }
        if self.threshold > 100 {
            return Err(DataError::Config(format!(
                "quality threshold must be within 0-100, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Reason code of an adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    NonFiniteValue,
    NegativeRevenue,
    MissingRevenue,
    NetMarginOutOfBounds,
    UndefinedNetMargin,
    NonRecurringItems,
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdjustmentReason::NonFiniteValue => "non_finite_value",
            AdjustmentReason::NegativeRevenue => "negative_revenue",
            AdjustmentReason::MissingRevenue => "missing_revenue",
            AdjustmentReason::NetMarginOutOfBounds => "net_margin_out_of_bounds",
            AdjustmentReason::UndefinedNetMargin => "undefined_net_margin",
            AdjustmentReason::NonRecurringItems => "non_recurring_items",
        })
    }
}

/// One row of the normalization ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub period: String,
    /// Field the adjustment concerns
    pub field: String,
    pub original: Option<f64>,
    pub adjusted: Option<f64>,
    pub reason: AdjustmentReason,
    /// Human-readable explanation
    pub detail: String,
    /// Whether the whole period was dropped from the normalized array
    pub excluded: bool,
}

/// Output of the quality gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSeries {
    pub raw: Vec<PeriodStatement>,
    pub normalized: Vec<PeriodStatement>,
    pub adjustments: Vec<AdjustmentRecord>,
    /// Share of periods that survived, 0 - 100
    pub quality_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Which array a consumer used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSource {
    Normalized,
    Raw,
}

impl fmt::Display for SeriesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeriesSource::Normalized => "normalized",
            SeriesSource::Raw => "raw",
        })
    }
}

/// A consumer's choice of array, with the score that drove it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSelection<'a> {
    pub source: SeriesSource,
    pub periods: &'a [PeriodStatement],
    pub quality_score: u8,
}

impl NormalizedSeries {
    /// Exclusion records only
    pub fn exclusions(&self) -> impl Iterator<Item = &AdjustmentRecord> {
        self.adjustments.iter().filter(|a| a.excluded)
    }

    /// Pick the normalized array when the score meets `threshold`, else raw
    ///
    /// `consumer` names the caller in the log line so every use of the
    /// series is traceable.
    pub fn select_series(&self, threshold: u8, consumer: &str) -> SeriesSelection<'_> {
        let use_normalized = self.warning.is_none() && self.quality_score >= threshold;
        let (source, periods) = if use_normalized {
            (SeriesSource::Normalized, self.normalized.as_slice())
        } else {
            (SeriesSource::Raw, self.raw.as_slice())
        };

        info!(
            consumer,
            source = %source,
            quality_score = self.quality_score,
            threshold,
            periods = periods.len(),
            "selected financial series"
        );

        SeriesSelection {
            source,
            periods,
            quality_score: self.quality_score,
        }
    }
}

/// Plausibility checker and normalizer
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    config: QualityGateConfig,
}

impl QualityGate {
    pub fn new(config: QualityGateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &QualityGateConfig {
        &self.config
    }

    /// Run the gate over an ordered series
    pub fn normalize(&self, raw: &[PeriodStatement]) -> NormalizedSeries {
        let mut normalized = Vec::with_capacity(raw.len());
        let mut adjustments = Vec::new();

        for period in raw {
            if let Some(rejection) = self.check(period) {
                warn!(
                    period = %period.period,
                    reason = %rejection.reason,
                    detail = %rejection.detail,
                    "quality gate excluded period"
                );
                adjustments.push(rejection);
                continue;
            }

            let mut cleaned = period.clone();
            if self.config.strip_non_recurring {
                if let Some(adjustment) = strip_non_recurring(&mut cleaned) {
                    adjustments.push(adjustment);
                }
            }
            normalized.push(cleaned);
        }

        if normalized.is_empty() {
            let warning = if raw.is_empty() {
                "no periods supplied".to_string()
            } else {
                format!(
                    "all {} periods failed the quality gate; raw data returned unmodified",
                    raw.len()
                )
            };
            warn!(periods = raw.len(), "{warning}");
            return NormalizedSeries {
                raw: raw.to_vec(),
                normalized: raw.to_vec(),
                adjustments,
                quality_score: 0,
                warning: Some(warning),
            };
        }

        let quality_score = ((normalized.len() as f64 / raw.len() as f64) * 100.0).round() as u8;
        info!(
            periods = raw.len(),
            survived = normalized.len(),
            adjustments = adjustments.len(),
            quality_score,
            "quality gate complete"
        );

        NormalizedSeries {
            raw: raw.to_vec(),
            normalized,
            adjustments,
            quality_score,
            warning: None,
        }
    }

    /// First failing plausibility check, as an excluding record
    fn check(&self, period: &PeriodStatement) -> Option<AdjustmentRecord> {
        let exclude = |field: &str, original: Option<f64>, reason, detail: String| {
            AdjustmentRecord {
                period: period.period.clone(),
                field: field.to_string(),
                original,
                adjusted: None,
                reason,
                detail,
                excluded: true,
            }
        };

        let fields = [
            ("revenue", period.revenue),
            ("ebitda", period.ebitda),
            ("operating_income", period.operating_income),
            ("net_income", period.net_income),
            ("non_recurring_items", period.non_recurring_items),
            ("free_cash_flow", period.free_cash_flow),
        ];
        if let Some((field, value)) = fields
            .iter()
            .find(|(_, value)| value.is_some_and(|v| !v.is_finite()))
        {
            return Some(exclude(
                field,
                None,
                AdjustmentReason::NonFiniteValue,
                format!("{field} is not a finite number ({value:?})"),
            ));
        }

        match (period.revenue, period.net_income) {
            (Some(revenue), _) if revenue < 0.0 => Some(exclude(
                "revenue",
                Some(revenue),
                AdjustmentReason::NegativeRevenue,
                format!("revenue {revenue} is negative"),
            )),
            (None, Some(income)) => Some(exclude(
                "revenue",
                None,
                AdjustmentReason::MissingRevenue,
                format!("net income {income} reported without revenue"),
            )),
            (Some(revenue), Some(income)) if revenue == 0.0 && income != 0.0 => Some(exclude(
                "net_margin",
                None,
                AdjustmentReason::UndefinedNetMargin,
                format!("net income {income} reported against zero revenue"),
            )),
            _ => {
                let margin = period.net_margin()?;
                let (low, high) = (self.config.min_net_margin, self.config.max_net_margin);
                if margin < low || margin > high {
                    Some(exclude(
                        "net_margin",
                        Some(margin),
                        AdjustmentReason::NetMarginOutOfBounds,
                        format!(
                            "net margin {:.1}% outside plausible range [{:.0}%, {:.0}%]",
                            margin * 100.0,
                            low * 100.0,
                            high * 100.0
                        ),
                    ))
                } else {
                    None
                }
            }
        }
    }
}

fn strip_non_recurring(period: &mut PeriodStatement) -> Option<AdjustmentRecord> {
    let items = period.non_recurring_items.filter(|v| *v != 0.0)?;
    let original = period.net_income?;
    let adjusted = original - items;
    period.net_income = Some(adjusted);
    period.non_recurring_items = None;

    Some(AdjustmentRecord {
        period: period.period.clone(),
        field: "net_income".to_string(),
        original: Some(original),
        adjusted: Some(adjusted),
        reason: AdjustmentReason::NonRecurringItems,
        detail: format!("removed non-recurring items of {items} from net income"),
        excluded: false,
    })
}
