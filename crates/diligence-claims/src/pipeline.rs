//! Synthesis: from the final run state to the consolidated record
//!
//! `extract -> prioritize/cap -> deduplicate -> batch -> verify -> reconcile -> assemble`
//!
//! [`ClaimPipeline::run`] never fails. Every extracted claim ends in the
//! ledger with a fate, and every section an agent was assigned to appears
//! in the record, degraded when its agents did not complete.

use crate::claim::{Claim, VerificationStatus};
use crate::dedupe::{DedupeOutcome, deduplicate};
use crate::error::{ClaimError, Result};
use crate::extract::extract_claims;
use crate::fallback::FallbackResolver;
use crate::ledger::{ClaimFate, ClaimLedger, LedgerEntry};
use crate::prioritize::{PriorityKeywords, PriorityRules, cap_per_agent};
use crate::reconcile::{NumericConflict, reconcile};
use crate::record::{
    AgentSummary, ConsolidatedRecord, RecordEntry, Section, SectionStatus, SeriesSummary,
    ValueSource,
};
use crate::verify::{ClaimVerifier, Evidence, EvidenceResult, Verdict};
use chrono::Utc;
use diligence_calc::Calculator;
use diligence_core::{AgentOutput, AgentStatus, PeriodStatement, RunState, SectionKind, keys};
use diligence_data::{AdjustmentRecord, QualityGate, SeriesSelection};
use diligence_runtime::{BoundedExecutor, CacheLayer, CachedCalculator, EvidenceSource};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Claim pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimsConfig {
    /// Claims kept per agent after prioritization
    pub max_claims_per_agent: usize,
    /// Claims per verification unit
    pub batch_size: usize,
    /// Evidence score needed for a verdict to count; also the section
    /// confidence below which a section is flagged low-confidence
    pub verified_threshold: f64,
    /// Relative tolerance under which two numbers are the same fact
    pub dedupe_tolerance: f64,
    /// Token overlap at which two texts are the same fact
    pub text_similarity: f64,
    pub keywords: PriorityKeywords,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            max_claims_per_agent: 5,
            batch_size: 5,
            verified_threshold: 0.6,
            dedupe_tolerance: 0.01,
            text_similarity: 0.6,
            keywords: PriorityKeywords::default(),
        }
    }
}

impl ClaimsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_claims_per_agent == 0 {
            return Err(ClaimError::Config(
                "max_claims_per_agent must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ClaimError::Config("batch_size must be at least 1".to_string()));
        }
        for (name, value) in [
            ("verified_threshold", self.verified_threshold),
            ("dedupe_tolerance", self.dedupe_tolerance),
            ("text_similarity", self.text_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ClaimError::Config(format!(
                    "{name} must be within 0.0-1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// What synthesis reads: the final state and every agent's outcome
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub state: &'a RunState,
    /// In execution order
    pub agents: &'a [AgentSummary],
}

impl<'a> SynthesisInput<'a> {
    pub fn new(state: &'a RunState, agents: &'a [AgentSummary]) -> Self {
        Self { state, agents }
    }
}

/// Judgement of one claim after verification
#[derive(Debug, Clone)]
struct Judgement {
    status: VerificationStatus,
    confidence: f64,
    fate: ClaimFate,
    evidence: Option<Evidence>,
}

pub struct ClaimPipeline {
    config: ClaimsConfig,
    rules: PriorityRules,
    verifier: ClaimVerifier,
    calculator: CachedCalculator,
    gate: QualityGate,
}

impl ClaimPipeline {
    pub fn new(
        config: ClaimsConfig,
        evidence: Arc<dyn EvidenceSource>,
        executor: BoundedExecutor,
        caches: &CacheLayer,
        calculator: Calculator,
        gate: QualityGate,
    ) -> Result<Self> {
        config.validate()?;
        let rules = PriorityRules::new(&config.keywords)?;
        let verifier = ClaimVerifier::new(
            evidence,
            caches.verification.clone(),
            executor,
            config.batch_size,
        );
        Ok(Self {
            rules,
            verifier,
            calculator: CachedCalculator::new(calculator, caches.calculation.clone()),
            gate,
            config,
        })
    }

    pub fn config(&self) -> &ClaimsConfig {
        &self.config
    }

    /// Build the consolidated record; called once per run
    pub async fn run(&self, input: SynthesisInput<'_>) -> ConsolidatedRecord {
        let completed: Vec<(&str, &AgentOutput)> = input
            .agents
            .iter()
            .filter(|a| a.status == AgentStatus::Completed)
            .filter_map(|a| {
                input
                    .state
                    .agent_output(&a.name)
                    .map(|output| (a.name.as_str(), output))
            })
            .collect();

        let mut ledger = ClaimLedger::new();

        // Extract and cap
        let mut candidates = Vec::new();
        for (agent, output) in &completed {
            let claims = extract_claims(agent, output, &self.rules);
            let extracted = claims.len();
            let (kept, cut) = cap_per_agent(claims, self.config.max_claims_per_agent);
            info!(
                agent,
                extracted,
                kept = kept.len(),
                deprioritized = cut.len(),
                "claims extracted"
            );
            for claim in cut {
                record_unverified(&mut ledger, claim, ClaimFate::Deprioritized);
            }
            candidates.extend(kept);
        }

        // Deduplicate
        let DedupeOutcome { survivors, merges } = deduplicate(
            candidates,
            self.config.dedupe_tolerance,
            self.config.text_similarity,
        );
        for merge in merges {
            record_unverified(
                &mut ledger,
                merge.merged,
                ClaimFate::MergedInto {
                    survivor: merge.survivor,
                },
            );
        }

        // Verify
        let results = self.verifier.verify_all(&survivors).await;
        let mut judged: Vec<(Claim, Judgement)> = survivors
            .into_iter()
            .zip(results)
            .map(|(claim, result)| {
                let judgement = self.judge(result);
                (claim, judgement)
            })
            .collect();

        // Reconcile
        let confidence: HashMap<String, f64> = judged
            .iter()
            .map(|(claim, j)| (claim.id().to_string(), j.confidence))
            .collect();
        let contestable: Vec<&Claim> = judged
            .iter()
            .filter(|(_, j)| j.status != VerificationStatus::Contradicted)
            .map(|(claim, _)| claim)
            .collect();
        let reconciliations = reconcile(
            &contestable,
            &confidence,
            &self.calculator,
            self.config.dedupe_tolerance,
        )
        .await;

        let mut corrections = Vec::new();
        let mut conflicts = Vec::new();
        for reconciliation in reconciliations {
            let inputs_verified = judged.iter().any(|(claim, j)| {
                j.status == VerificationStatus::Verified
                    && reconciliation.correction.supersedes().iter().any(|id| id == claim.id())
            });
            for (claim, judgement) in &mut judged {
                if reconciliation.correction.supersedes().iter().any(|id| id == claim.id()) {
                    judgement.fate = ClaimFate::Reconciled {
                        into: reconciliation.correction.id().to_string(),
                    };
                }
            }

            let confidence = reconciliation.conflict.confidence();
            let threshold = self.config.verified_threshold;
            let judgement = if inputs_verified && confidence >= threshold {
                Judgement {
                    status: VerificationStatus::Verified,
                    confidence,
                    fate: ClaimFate::Verified,
                    evidence: None,
                }
            } else {
                let reason = if inputs_verified {
                    format!("resolved confidence {confidence:.2} below threshold {threshold:.2}")
                } else {
                    "resolved from unverified inputs".to_string()
                };
                Judgement {
                    status: VerificationStatus::LowConfidence,
                    confidence,
                    fate: ClaimFate::LowConfidence { reason },
                    evidence: None,
                }
            };
            corrections.push((reconciliation.correction, judgement));
            conflicts.push(reconciliation.conflict);
        }

        for (claim, judgement) in judged.into_iter().chain(corrections) {
            ledger.record(LedgerEntry {
                claim,
                status: judgement.status,
                confidence: judgement.confidence,
                fate: judgement.fate,
                evidence: judgement.evidence,
                superseded_by: None,
            });
        }
        let correction_claims: Vec<Claim> = ledger
            .entries()
            .iter()
            .filter(|e| !e.claim.supersedes().is_empty())
            .map(|e| e.claim.clone())
            .collect();
        for correction in &correction_claims {
            ledger.link_supersession(correction);
        }

        self.assemble(input, &completed, ledger, conflicts).await
    }

    fn judge(&self, result: EvidenceResult) -> Judgement {
        let threshold = self.config.verified_threshold;
        match result.evidence {
            Some(evidence)
                if evidence.verdict == Verdict::Supported && evidence.score >= threshold =>
            {
                Judgement {
                    status: VerificationStatus::Verified,
                    confidence: evidence.score,
                    fate: ClaimFate::Verified,
                    evidence: Some(evidence),
                }
            }
            Some(evidence)
                if evidence.verdict == Verdict::Contradicted && evidence.score >= threshold =>
            {
                Judgement {
                    status: VerificationStatus::Contradicted,
                    confidence: 1.0 - evidence.score,
                    fate: ClaimFate::Contradicted,
                    evidence: Some(evidence),
                }
            }
            Some(evidence) => Judgement {
                status: VerificationStatus::LowConfidence,
                confidence: evidence.score,
                fate: ClaimFate::LowConfidence {
                    reason: format!(
                        "{} verdict with score {:.2}",
                        evidence.verdict, evidence.score
                    ),
                },
                evidence: Some(evidence),
            },
            None => Judgement {
                status: VerificationStatus::LowConfidence,
                confidence: 0.0,
                fate: ClaimFate::LowConfidence {
                    reason: result
                        .failure
                        .unwrap_or_else(|| "no evidence returned".to_string()),
                },
                evidence: None,
            },
        }
    }

    async fn assemble(
        &self,
        input: SynthesisInput<'_>,
        completed: &[(&str, &AgentOutput)],
        ledger: ClaimLedger,
        conflicts: Vec<NumericConflict>,
    ) -> ConsolidatedRecord {
        let mut sections: BTreeMap<SectionKind, Section> = BTreeMap::new();
        for agent in input.agents {
            let section = sections
                .entry(agent.section)
                .or_insert_with(|| Section::new(agent.section));
            section.agents.push(agent.name.clone());
            if matches!(agent.status, AgentStatus::Failed | AgentStatus::Skipped) {
                section.notes.push(format!(
                    "agent {} {}: {}",
                    agent.name,
                    status_word(agent.status),
                    agent.error.as_deref().unwrap_or("no reason recorded")
                ));
            }
        }

        // Claims that survived to a usable fate
        for entry in ledger.entries() {
            let low_confidence = match &entry.fate {
                ClaimFate::Verified => false,
                ClaimFate::LowConfidence { .. } => true,
                ClaimFate::Contradicted => {
                    section_of(&mut sections, entry.claim.section())
                        .notes
                        .push(format!("contradicted: {}", entry.claim.statement()));
                    continue;
                }
                _ => continue,
            };
            let source = if entry.claim.supersedes().is_empty() {
                ValueSource::Claim
            } else {
                ValueSource::Derived
            };
            section_of(&mut sections, entry.claim.section())
                .entries
                .push(RecordEntry {
                    field: entry.claim.key().to_string(),
                    value: entry.claim.value().to_json(),
                    source,
                    confidence: entry.confidence,
                    agent: Some(entry.claim.agent().to_string()),
                    claim_id: Some(entry.claim.id().to_string()),
                    low_confidence,
                });
        }

        for conflict in &conflicts {
            let listed: Vec<String> = conflict
                .inputs
                .iter()
                .map(|i| format!("{}={}", i.agent, i.value))
                .collect();
            section_of(&mut sections, conflict.section).notes.push(format!(
                "conflict on {} ({}) resolved to {} by {}",
                conflict.key,
                listed.join(", "),
                conflict.resolved_value,
                conflict.methodology.to_lowercase()
            ));
        }

        // Structured sub-results merged as-is
        for (agent, output) in completed {
            for calculation in output.calculations() {
                section_of(&mut sections, output.section())
                    .entries
                    .push(RecordEntry {
                        field: format!("calculation:{}", calculation.operation),
                        value: json!({
                            "result": calculation.result,
                            "methodology": calculation.methodology,
                            "steps": calculation.steps,
                        }),
                        source: ValueSource::Derived,
                        confidence: 1.0,
                        agent: Some((*agent).to_string()),
                        claim_id: None,
                        low_confidence: false,
                    });
            }
        }

        let (series, adjustments) = self
            .merge_financial_series(input.state, completed, &mut sections)
            .await;

        for section in sections.values_mut() {
            self.settle_status(section, input.agents);
        }

        let record = ConsolidatedRecord {
            run_id: input.state.run_id().to_string(),
            created_at: Utc::now(),
            sections,
            conflicts,
            ledger,
            adjustments,
            series,
            agents: input.agents.to_vec(),
            raw_outputs: completed
                .iter()
                .map(|(agent, output)| ((*agent).to_string(), (*output).clone()))
                .collect(),
        };

        let summary = record.ledger.summary();
        info!(
            run_id = %record.run_id,
            sections = record.sections.len(),
            missing = record.missing_sections().len(),
            low_confidence = record.low_confidence_sections().len(),
            verified = summary.verified,
            low_confidence_claims = summary.low_confidence,
            conflicts = record.conflicts.len(),
            "consolidated record assembled"
        );
        record
    }

    /// Gate the financial series and merge the selected array
    async fn merge_financial_series(
        &self,
        state: &RunState,
        completed: &[(&str, &AgentOutput)],
        sections: &mut BTreeMap<SectionKind, Section>,
    ) -> (Option<SeriesSummary>, Vec<AdjustmentRecord>) {
        let resolver = FallbackResolver::new()
            .then("agent_output", |_: &RunState| {
                completed
                    .iter()
                    .find(|(_, output)| !output.periods().is_empty())
                    .map(|(agent, output)| ((*agent).to_string(), output.periods().to_vec()))
            })
            .then("input_slot", |state: &RunState| {
                let value = state.resolve(keys::FINANCIALS)?.value.as_json()?.clone();
                serde_json::from_value::<Vec<PeriodStatement>>(value)
                    .ok()
                    .filter(|periods| !periods.is_empty())
                    .map(|periods| (keys::FINANCIALS.to_string(), periods))
            });

        let Some(found) = resolver.resolve(state) else {
            return (None, Vec::new());
        };
        let (origin, raw) = found.value;

        let normalized = self.gate.normalize(&raw);
        let selection =
            normalized.select_series(self.gate.config().threshold, "consolidated_record");
        let confidence = f64::from(selection.quality_score) / 100.0;
        let low_confidence = ValueSource::from(selection.source) == ValueSource::Raw;

        let section = section_of(sections, SectionKind::Financial);
        match periods_entry(&selection, &origin, confidence, low_confidence) {
            Ok(entry) => section.entries.push(entry),
            Err(e) => {
                warn!(error = %e, "financial periods not merged");
                section
                    .notes
                    .push(format!("financial periods could not be merged: {e}"));
            }
        }
        if let Some(warning) = &normalized.warning {
            section.notes.push(warning.clone());
        }

        if let Some((first, last, years)) = revenue_span(&normalized.raw, selection.periods) {
            match self.calculator.cagr(first, last, years).await {
                Ok(calculation) => {
                    section.entries.push(RecordEntry {
                        field: "revenue_cagr".to_string(),
                        value: json!(calculation.result),
                        source: ValueSource::Derived,
                        confidence,
                        agent: Some(origin.clone()),
                        claim_id: None,
                        low_confidence,
                    });
                    section
                        .notes
                        .push(format!("revenue_cagr: {}", calculation.methodology));
                }
                Err(e) => warn!(error = %e, "revenue CAGR not computed"),
            }
        }

        let summary = SeriesSummary {
            origin,
            source: selection.source,
            quality_score: selection.quality_score,
            periods: selection.periods.len(),
            warning: normalized.warning.clone(),
        };
        (Some(summary), normalized.adjustments)
    }

    fn settle_status(&self, section: &mut Section, agents: &[AgentSummary]) {
        let assigned: Vec<&AgentSummary> = agents
            .iter()
            .filter(|a| a.section == section.kind)
            .collect();
        let completed = assigned
            .iter()
            .filter(|a| a.status == AgentStatus::Completed)
            .count();

        section.confidence = if section.entries.is_empty() {
            0.0
        } else {
            section.entries.iter().map(|e| e.confidence).sum::<f64>() / section.entries.len() as f64
        };

        section.status = if (!assigned.is_empty() && completed == 0)
            || (assigned.is_empty() && section.entries.is_empty())
        {
            SectionStatus::Missing
        } else if completed < assigned.len()
            || section.entries.is_empty()
            || section.confidence < self.config.verified_threshold
        {
            SectionStatus::LowConfidence
        } else {
            SectionStatus::Populated
        };

        if section.status != SectionStatus::Populated {
            warn!(
                section = %section.kind,
                status = %section.status,
                confidence = section.confidence,
                "section degraded"
            );
        }
    }
}

fn record_unverified(ledger: &mut ClaimLedger, claim: Claim, fate: ClaimFate) {
    let confidence = claim.source_confidence();
    ledger.record(LedgerEntry {
        claim,
        status: VerificationStatus::Unverified,
        confidence,
        fate,
        evidence: None,
        superseded_by: None,
    });
}

/// The selected period array as one record entry
fn periods_entry(
    selection: &SeriesSelection<'_>,
    origin: &str,
    confidence: f64,
    low_confidence: bool,
) -> Result<RecordEntry> {
    Ok(RecordEntry {
        field: "periods".to_string(),
        value: serde_json::to_value(selection.periods)?,
        source: ValueSource::from(selection.source),
        confidence,
        agent: Some(origin.to_string()),
        claim_id: None,
        low_confidence,
    })
}

/// First and last revenue of the selection and the years between them
///
/// Years are counted by position in the raw series, so periods the gate
/// excluded still count toward the span.
fn revenue_span(raw: &[PeriodStatement], selected: &[PeriodStatement]) -> Option<(f64, f64, f64)> {
    let mut with_revenue = selected
        .iter()
        .filter_map(|p| p.revenue.map(|revenue| (p.period.as_str(), revenue)));
    let (first_period, first) = with_revenue.next()?;
    let (last_period, last) = with_revenue.last()?;

    let position = |label: &str| raw.iter().position(|p| p.period == label);
    let span = position(last_period)?.checked_sub(position(first_period)?)?;
    if span == 0 {
        return None;
    }
    Some((first, last, span as f64))
}

fn section_of(sections: &mut BTreeMap<SectionKind, Section>, kind: SectionKind) -> &mut Section {
    sections.entry(kind).or_insert_with(|| Section::new(kind))
}

fn status_word(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Failed => "failed",
        AgentStatus::Skipped => "skipped",
        AgentStatus::Pending => "pending",
        AgentStatus::Running => "running",
        AgentStatus::Completed => "completed",
    }
}
