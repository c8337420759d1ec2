//! Typed agent outputs
//!
//! Every agent returns one [`AgentOutput`] variant for its domain. Each
//! variant carries typed fields for the facts the synthesis stage knows how
//! to consolidate, plus an open `extra` map for sub-fields that are still
//! evolving.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Open map for untyped sub-fields; ordered so serialization is stable
pub type Extra = BTreeMap<String, serde_json::Value>;

/// Section of the consolidated record an output belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Financial,
    Valuation,
    Legal,
    Market,
    Risk,
    General,
}

impl SectionKind {
    /// All sections in record order
    pub const ALL: [SectionKind; 6] = [
        SectionKind::Financial,
        SectionKind::Valuation,
        SectionKind::Legal,
        SectionKind::Market,
        SectionKind::Risk,
        SectionKind::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Financial => "financial",
            SectionKind::Valuation => "valuation",
            SectionKind::Legal => "legal",
            SectionKind::Market => "market",
            SectionKind::Risk => "risk",
            SectionKind::General => "general",
        }
    }

    /// Parse a section name case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported financial period as delivered by a data backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodStatement {
    /// Period identifier, e.g. "FY2023" or "2024-Q2"
    pub period: String,
    pub revenue: Option<f64>,
    pub ebitda: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    /// One-off gains (positive) or charges (negative) included in net income
    pub non_recurring_items: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

impl PeriodStatement {
    pub fn new(period: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            ..Default::default()
        }
    }

    /// Net income over revenue, when both are present and revenue is non-zero
    pub fn net_margin(&self) -> Option<f64> {
        match (self.net_income, self.revenue) {
            (Some(income), Some(revenue)) if revenue != 0.0 => Some(income / revenue),
            _ => None,
        }
    }
}

/// A discrete textual assertion made by an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Finding {
    /// Fact key the statement is about, e.g. "customer_concentration"
    pub topic: String,
    pub statement: String,
    /// Numeric value the statement asserts, if any
    pub value: Option<f64>,
    /// Agent's own confidence in the statement, 0.0 - 1.0
    pub confidence: Option<f64>,
}

impl Finding {
    pub fn new(topic: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            statement: statement.into(),
            value: None,
            confidence: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }
}

/// Serialized result of a deterministic calculation, merged without claim
/// extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRecord {
    /// Operation name, e.g. "dcf"
    pub operation: String,
    pub result: serde_json::Value,
    pub methodology: String,
    /// Rendered calculation steps in order
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialOutput {
    pub revenue: Option<f64>,
    pub ebitda: Option<f64>,
    pub net_income: Option<f64>,
    pub total_debt: Option<f64>,
    /// Raw per-period statements; normalized during synthesis
    pub periods: Vec<PeriodStatement>,
    pub findings: Vec<Finding>,
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationOutput {
    pub enterprise_value: Option<f64>,
    pub equity_value: Option<f64>,
    pub wacc: Option<f64>,
    pub calculations: Vec<CalculationRecord>,
    pub findings: Vec<Finding>,
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalOutput {
    pub open_litigation: Option<u32>,
    pub regulatory_flags: Vec<String>,
    pub findings: Vec<Finding>,
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketOutput {
    pub market_size: Option<f64>,
    pub market_share: Option<f64>,
    pub growth_rate: Option<f64>,
    pub competitors: Vec<String>,
    pub findings: Vec<Finding>,
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskOutput {
    /// Aggregate risk score, 0 (benign) - 100 (severe)
    pub overall_score: Option<f64>,
    pub risks: Vec<String>,
    pub findings: Vec<Finding>,
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralOutput {
    pub summary: Option<String>,
    pub findings: Vec<Finding>,
    pub extra: Extra,
}

/// Tagged result of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum AgentOutput {
    Financial(FinancialOutput),
    Valuation(ValuationOutput),
    Legal(LegalOutput),
    Market(MarketOutput),
    Risk(RiskOutput),
    General(GeneralOutput),
}

impl AgentOutput {
    /// Section this output populates
    pub fn section(&self) -> SectionKind {
        match self {
            AgentOutput::Financial(_) => SectionKind::Financial,
            AgentOutput::Valuation(_) => SectionKind::Valuation,
            AgentOutput::Legal(_) => SectionKind::Legal,
            AgentOutput::Market(_) => SectionKind::Market,
            AgentOutput::Risk(_) => SectionKind::Risk,
            AgentOutput::General(_) => SectionKind::General,
        }
    }

    pub fn findings(&self) -> &[Finding] {
        match self {
            AgentOutput::Financial(o) => &o.findings,
            AgentOutput::Valuation(o) => &o.findings,
            AgentOutput::Legal(o) => &o.findings,
            AgentOutput::Market(o) => &o.findings,
            AgentOutput::Risk(o) => &o.findings,
            AgentOutput::General(o) => &o.findings,
        }
    }

    pub fn extra(&self) -> &Extra {
        match self {
            AgentOutput::Financial(o) => &o.extra,
            AgentOutput::Valuation(o) => &o.extra,
            AgentOutput::Legal(o) => &o.extra,
            AgentOutput::Market(o) => &o.extra,
            AgentOutput::Risk(o) => &o.extra,
            AgentOutput::General(o) => &o.extra,
        }
    }

    /// Typed numeric facts, in declaration order, followed by numeric
    /// entries of `extra`
    pub fn metrics(&self) -> Vec<(String, f64)> {
        let typed: Vec<(&str, Option<f64>)> = match self {
            AgentOutput::Financial(o) => vec![
                ("revenue", o.revenue),
                ("ebitda", o.ebitda),
                ("net_income", o.net_income),
                ("total_debt", o.total_debt),
            ],
            AgentOutput::Valuation(o) => vec![
                ("enterprise_value", o.enterprise_value),
                ("equity_value", o.equity_value),
                ("wacc", o.wacc),
            ],
            AgentOutput::Legal(o) => vec![("open_litigation", o.open_litigation.map(f64::from))],
            AgentOutput::Market(o) => vec![
                ("market_size", o.market_size),
                ("market_share", o.market_share),
                ("growth_rate", o.growth_rate),
            ],
            AgentOutput::Risk(o) => vec![("overall_score", o.overall_score)],
            AgentOutput::General(_) => Vec::new(),
        };

        typed
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .chain(
                self.extra()
                    .iter()
                    .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v))),
            )
            .collect()
    }

    /// Enumerated textual items (flags, competitors, risks) with the fact
    /// key they belong to
    pub fn listed_items(&self) -> Vec<(&'static str, &str)> {
        match self {
            AgentOutput::Legal(o) => o
                .regulatory_flags
                .iter()
                .map(|flag| ("regulatory_flag", flag.as_str()))
                .collect(),
            AgentOutput::Market(o) => o
                .competitors
                .iter()
                .map(|name| ("competitor", name.as_str()))
                .collect(),
            AgentOutput::Risk(o) => o.risks.iter().map(|risk| ("risk", risk.as_str())).collect(),
            _ => Vec::new(),
        }
    }

    /// Calculator outputs carried by this agent
    pub fn calculations(&self) -> &[CalculationRecord] {
        match self {
            AgentOutput::Valuation(o) => &o.calculations,
            _ => &[],
        }
    }

    /// Raw statements carried by this agent
    pub fn periods(&self) -> &[PeriodStatement] {
        match self {
            AgentOutput::Financial(o) => &o.periods,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_section_parse_roundtrip() {
        for kind in SectionKind::ALL {
            assert_eq!(SectionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SectionKind::parse(" Legal "), Some(SectionKind::Legal));
        assert_eq!(SectionKind::parse("tax"), None);
    }

    #[test]
    fn test_net_margin() {
        let mut period = PeriodStatement::new("FY2023");
        assert_eq!(period.net_margin(), None);

        period.revenue = Some(200.0);
        period.net_income = Some(-50.0);
        assert_eq!(period.net_margin(), Some(-0.25));

        period.revenue = Some(0.0);
        assert_eq!(period.net_margin(), None);
    }

    #[test]
    fn test_metrics_include_numeric_extra() {
        let mut extra = Extra::new();
        extra.insert("tam_growth".to_string(), json!(0.12));
        extra.insert("note".to_string(), json!("not numeric"));

        let output = AgentOutput::Market(MarketOutput {
            market_size: Some(5_000.0),
            growth_rate: None,
            extra,
            ..Default::default()
        });

        let metrics = output.metrics();
        assert_eq!(
            metrics,
            vec![
                ("market_size".to_string(), 5_000.0),
                ("tam_growth".to_string(), 0.12)
            ]
        );
    }

    #[test]
    fn test_tagged_serialization() {
        let output = AgentOutput::Legal(LegalOutput {
            open_litigation: Some(2),
            regulatory_flags: vec!["antitrust review".to_string()],
            ..Default::default()
        });
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["category"], "legal");
        assert_eq!(value["open_litigation"], 2);

        let back: AgentOutput = serde_json::from_value(value).unwrap();
        assert_eq!(back.section(), SectionKind::Legal);
        assert_eq!(back.listed_items(), vec![("regulatory_flag", "antitrust review")]);
    }
}
