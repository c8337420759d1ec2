//! The consolidated record
//!
//! One record per run, created once after every agent has concluded and
//! never modified afterwards. Each section lists its entries with a source
//! tag and a confidence. Readers that cannot find a field in a section may
//! fall back to the raw agent outputs kept alongside, but such values are
//! always labelled [`ValueSource::Raw`] and low-confidence.

use crate::fallback::FallbackResolver;
use crate::ledger::ClaimLedger;
use crate::reconcile::NumericConflict;
use chrono::{DateTime, Utc};
use diligence_core::{AgentOutput, AgentStatus, SectionKind};
use diligence_data::{AdjustmentRecord, SeriesSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where an entry's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Quality-gated financial series
    Normalized,
    /// Unvetted data: the raw series or an agent output read directly
    Raw,
    /// Computed during synthesis (calculations, conflict resolutions)
    Derived,
    /// A claim that went through verification
    Claim,
}

impl From<SeriesSource> for ValueSource {
    fn from(source: SeriesSource) -> Self {
        match source {
            SeriesSource::Normalized => ValueSource::Normalized,
            SeriesSource::Raw => ValueSource::Raw,
        }
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueSource::Normalized => "normalized",
            ValueSource::Raw => "raw",
            ValueSource::Derived => "derived",
            ValueSource::Claim => "claim",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub field: String,
    pub value: serde_json::Value,
    pub source: ValueSource,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    /// Set when the value did not pass verification or came from raw data
    #[serde(default)]
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Populated,
    LowConfidence,
    Missing,
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SectionStatus::Populated => "populated",
            SectionStatus::LowConfidence => "low_confidence",
            SectionStatus::Missing => "missing",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub status: SectionStatus,
    /// Mean confidence of the entries
    pub confidence: f64,
    /// Agents assigned to this section, whatever their outcome
    pub agents: Vec<String>,
    pub entries: Vec<RecordEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Section {
    pub fn new(kind: SectionKind) -> Self {
        Self {
            kind,
            status: SectionStatus::Missing,
            confidence: 0.0,
            agents: Vec::new(),
            entries: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Highest-confidence entry for a field among those matching `accept`
    fn best_entry(
        &self,
        field: &str,
        accept: impl Fn(&RecordEntry) -> bool,
    ) -> Option<&RecordEntry> {
        self.entries
            .iter()
            .filter(|e| e.field == field && accept(e))
            .fold(None, |best: Option<&RecordEntry>, entry| match best {
                Some(b) if b.confidence >= entry.confidence => Some(b),
                _ => Some(entry),
            })
    }

    /// Every entry for a field, in record order
    pub fn entries_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a RecordEntry> + 'a {
        self.entries.iter().filter(move |e| e.field == field)
    }
}

/// Outcome of one agent as seen by synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub name: String,
    pub section: SectionKind,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentSummary {
    pub fn completed(name: impl Into<String>, section: SectionKind) -> Self {
        Self {
            name: name.into(),
            section,
            status: AgentStatus::Completed,
            error: None,
        }
    }
}

/// Which financial series the record was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    /// Agent (or input slot) that delivered the statements
    pub origin: String,
    pub source: SeriesSource,
    pub quality_score: u8,
    pub periods: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A field as handed to a renderer, always with its source and confidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValue {
    pub value: serde_json::Value,
    pub source: ValueSource,
    pub confidence: f64,
    pub low_confidence: bool,
}

impl From<&RecordEntry> for FieldValue {
    fn from(entry: &RecordEntry) -> Self {
        Self {
            value: entry.value.clone(),
            source: entry.source,
            confidence: entry.confidence,
            low_confidence: entry.low_confidence,
        }
    }
}

/// The single synthesized output of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRecord {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub sections: BTreeMap<SectionKind, Section>,
    pub conflicts: Vec<NumericConflict>,
    pub ledger: ClaimLedger,
    pub adjustments: Vec<AdjustmentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<SeriesSummary>,
    pub agents: Vec<AgentSummary>,
    /// Completed agents' outputs, for labelled fallback reads only
    pub raw_outputs: BTreeMap<String, AgentOutput>,
}

impl ConsolidatedRecord {
    /// Section by name, case-insensitive
    pub fn get_section(&self, name: &str) -> Option<&Section> {
        SectionKind::parse(name).and_then(|kind| self.sections.get(&kind))
    }

    /// Resolve one field of a section
    ///
    /// Tried in order: a confident entry, a low-confidence entry, then the
    /// raw output of any agent assigned to the section. A raw value is
    /// always tagged [`ValueSource::Raw`] with zero confidence.
    pub fn get_field(&self, section: SectionKind, field: &str) -> Option<FieldValue> {
        let resolver = FallbackResolver::new()
            .then("record", |record: &ConsolidatedRecord| {
                record
                    .sections
                    .get(&section)?
                    .best_entry(field, |e| !e.low_confidence)
                    .map(FieldValue::from)
            })
            .then("record_low_confidence", |record: &ConsolidatedRecord| {
                record
                    .sections
                    .get(&section)?
                    .best_entry(field, |e| e.low_confidence)
                    .map(FieldValue::from)
            })
            .then("raw_agent_output", |record: &ConsolidatedRecord| {
                record.raw_field(section, field)
            });

        let resolved = resolver.resolve(self)?;
        if resolved.fell_back() {
            tracing::debug!(
                section = %section,
                field,
                via = resolved.label,
                "field resolved through fallback"
            );
        }
        Some(resolved.value)
    }

    fn raw_field(&self, section: SectionKind, field: &str) -> Option<FieldValue> {
        self.raw_outputs
            .values()
            .filter(|output| output.section() == section)
            .find_map(|output| {
                output
                    .metrics()
                    .into_iter()
                    .find(|(name, _)| name == field)
                    .map(|(_, value)| serde_json::json!(value))
                    .or_else(|| output.extra().get(field).cloned())
            })
            .map(|value| FieldValue {
                value,
                source: ValueSource::Raw,
                confidence: 0.0,
                low_confidence: true,
            })
    }

    pub fn missing_sections(&self) -> Vec<SectionKind> {
        self.sections_with(SectionStatus::Missing)
    }

    pub fn low_confidence_sections(&self) -> Vec<SectionKind> {
        self.sections_with(SectionStatus::LowConfidence)
    }

    fn sections_with(&self, status: SectionStatus) -> Vec<SectionKind> {
        self.sections
            .values()
            .filter(|s| s.status == status)
            .map(|s| s.kind)
            .collect()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
