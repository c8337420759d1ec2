//! Per-claim fate ledger
//!
//! Every extracted claim ends up here exactly once, together with every
//! correction claim the pipeline created.

use crate::claim::{Claim, VerificationStatus};
use crate::verify::Evidence;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fate", rename_all = "snake_case")]
pub enum ClaimFate {
    Verified,
    Contradicted,
    LowConfidence { reason: String },
    /// Folded into a duplicate from a more confident source
    MergedInto { survivor: String },
    /// Cut by the per-agent cap before verification
    Deprioritized,
    /// Replaced by the resolution of a numeric conflict
    Reconciled { into: String },
}

impl fmt::Display for ClaimFate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimFate::Verified => f.write_str("verified"),
            ClaimFate::Contradicted => f.write_str("contradicted"),
            ClaimFate::LowConfidence { reason } => write!(f, "low confidence ({reason})"),
            ClaimFate::MergedInto { survivor } => write!(f, "merged into {survivor}"),
            ClaimFate::Deprioritized => f.write_str("deprioritized"),
            ClaimFate::Reconciled { into } => write!(f, "reconciled into {into}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub claim: Claim,
    pub status: VerificationStatus,
    pub confidence: f64,
    pub fate: ClaimFate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

/// Counts per fate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub verified: usize,
    pub contradicted: usize,
    pub low_confidence: usize,
    pub merged: usize,
    pub deprioritized: usize,
    pub reconciled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimLedger {
    entries: Vec<LedgerEntry>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    /// Link every claim a correction replaces back to it
    pub fn link_supersession(&mut self, correction: &Claim) {
        for entry in &mut self.entries {
            if correction.supersedes().iter().any(|id| id == entry.claim.id()) {
                entry.superseded_by = Some(correction.id().to_string());
            }
        }
    }

    pub fn get(&self, claim_id: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.claim.id() == claim_id)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose claim came from `agent`
    pub fn for_agent<'a>(&'a self, agent: &'a str) -> impl Iterator<Item = &'a LedgerEntry> + 'a {
        self.entries.iter().filter(move |e| e.claim.agent() == agent)
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary::default();
        for entry in &self.entries {
            match entry.fate {
                ClaimFate::Verified => summary.verified += 1,
                ClaimFate::Contradicted => summary.contradicted += 1,
                ClaimFate::LowConfidence { .. } => summary.low_confidence += 1,
                ClaimFate::MergedInto { .. } => summary.merged += 1,
                ClaimFate::Deprioritized => summary.deprioritized += 1,
                ClaimFate::Reconciled { .. } => summary.reconciled += 1,
            }
        }
        summary
    }
}
