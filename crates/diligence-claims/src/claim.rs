//! Claim model
//!
//! A claim is an atomic assertion taken from one agent's output. Claims are
//! never modified after extraction: a correction is a new claim whose
//! `supersedes` list names the claims it replaces, and the ledger records
//! the matching `superseded_by` link on the originals.

use diligence_core::SectionKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value asserted by a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Number(f64),
    Text(String),
}

impl ClaimValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ClaimValue::Number(n) => Some(*n),
            ClaimValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ClaimValue::Text(s) => Some(s),
            ClaimValue::Number(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ClaimValue::Number(n) => serde_json::json!(n),
            ClaimValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimValue::Number(n) => write!(f, "{n}"),
            ClaimValue::Text(s) => f.write_str(s),
        }
    }
}

/// Where in the agent output a claim came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimCategory {
    /// Typed or `extra` numeric field
    Metric,
    Finding,
    RegulatoryFlag,
    Competitor,
    Risk,
}

impl ClaimCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimCategory::Metric => "metric",
            ClaimCategory::Finding => "finding",
            ClaimCategory::RegulatoryFlag => "regulatory_flag",
            ClaimCategory::Competitor => "competitor",
            ClaimCategory::Risk => "risk",
        }
    }

    /// Category of an enumerated item kind
    pub fn from_item_kind(kind: &str) -> Self {
        match kind {
            "regulatory_flag" => ClaimCategory::RegulatoryFlag,
            "competitor" => ClaimCategory::Competitor,
            "risk" => ClaimCategory::Risk,
            _ => ClaimCategory::Finding,
        }
    }
}

impl fmt::Display for ClaimCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority tier; declaration order is importance order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Verified,
    Contradicted,
    LowConfidence,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Contradicted => "contradicted",
            VerificationStatus::LowConfidence => "low_confidence",
        })
    }
}

/// Confidence given to a claim whose source did not state one
pub const DEFAULT_SOURCE_CONFIDENCE: f64 = 0.5;

/// An atomic factual assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    id: String,
    agent: String,
    section: SectionKind,
    category: ClaimCategory,
    /// Fact identifier shared by claims about the same thing
    key: String,
    statement: String,
    value: ClaimValue,
    priority: Priority,
    source_confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    supersedes: Vec<String>,
}

impl Claim {
    /// Start a claim; the statement defaults to `key = value`
    pub fn new(
        id: impl Into<String>,
        agent: impl Into<String>,
        section: SectionKind,
        category: ClaimCategory,
        key: impl Into<String>,
        value: ClaimValue,
    ) -> Self {
        let key = normalize_key(&key.into());
        let statement = format!("{} = {value}", key.replace('_', " "));
        Self {
            id: id.into(),
            agent: agent.into(),
            section,
            category,
            key,
            statement,
            value,
            priority: Priority::Low,
            source_confidence: DEFAULT_SOURCE_CONFIDENCE,
            supersedes: Vec::new(),
        }
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = statement.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_source_confidence(mut self, confidence: f64) -> Self {
        self.source_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// New claim replacing `replaced` with a corrected value
    ///
    /// The correction keeps this claim's agent, section, category, and key.
    pub fn correction(
        &self,
        id: impl Into<String>,
        value: ClaimValue,
        replaced: Vec<String>,
        statement: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent: self.agent.clone(),
            section: self.section,
            category: self.category,
            key: self.key.clone(),
            statement: statement.into(),
            value,
            priority: self.priority,
            source_confidence: self.source_confidence,
            supersedes: replaced,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn section(&self) -> SectionKind {
        self.section
    }

    pub fn category(&self) -> ClaimCategory {
        self.category
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn value(&self) -> &ClaimValue {
        &self.value
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn source_confidence(&self) -> f64 {
        self.source_confidence
    }

    pub fn supersedes(&self) -> &[String] {
        &self.supersedes
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.value, ClaimValue::Number(_))
    }
}

/// Lowercase, trimmed, inner whitespace and dashes folded to `_`
pub fn normalize_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_claim_defaults() {
        let claim = Claim::new(
            "financial#1",
            "financial",
            SectionKind::Financial,
            ClaimCategory::Metric,
            "Net Income",
            ClaimValue::Number(120.5),
        );
        assert_eq!(claim.key(), "net_income");
        assert_eq!(claim.statement(), "net income = 120.5");
        assert_eq!(claim.priority(), Priority::Low);
        assert_eq!(claim.source_confidence(), DEFAULT_SOURCE_CONFIDENCE);
        assert!(claim.supersedes().is_empty());
    }

    #[test]
    fn test_correction_links_back() {
        let original = Claim::new(
            "market#2",
            "market",
            SectionKind::Market,
            ClaimCategory::Metric,
            "market_size",
            ClaimValue::Number(100.0),
        )
        .with_priority(Priority::High);

        let corrected = original.correction(
            "market#2/resolved",
            ClaimValue::Number(110.0),
            vec!["market#2".into(), "risk#1".into()],
            "market size = 110 (median of 100, 120)",
        );

        assert_eq!(original.value(), &ClaimValue::Number(100.0));
        assert_eq!(corrected.agent(), "market");
        assert_eq!(corrected.priority(), Priority::High);
        assert_eq!(corrected.supersedes(), ["market#2", "risk#1"]);
    }

    #[test]
    fn test_priority_order() {
        let mut tiers = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        tiers.sort();
        assert_eq!(
            tiers,
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn test_value_serialization_untagged() {
        assert_eq!(serde_json::to_string(&ClaimValue::Number(1.5)).unwrap(), "1.5");
        assert_eq!(
            serde_json::from_str::<ClaimValue>("\"Acme\"").unwrap(),
            ClaimValue::Text("Acme".into())
        );
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Market-Share  "), "market_share");
        assert_eq!(normalize_key("EBITDA margin"), "ebitda_margin");
    }
}
