//! Batched, cached, parallel claim verification
//!
//! Claims are grouped into fixed-size batches. Each batch is one unit of
//! work on the bounded executor: it consults the verification cache, sends
//! one prompt covering only the misses, and parses a JSON array reply. A
//! batch that times out or fails leaves its claims without evidence; the
//! pipeline turns those into low-confidence fates.

use crate::claim::Claim;
use diligence_core::{Error, Result};
use diligence_runtime::{BoundedExecutor, EvidenceSource, Fingerprint, TtlCache};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bumped whenever the prompt or reply format changes, invalidating cached evidence
const PROMPT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Supported,
    Contradicted,
    Unclear,
}

impl Verdict {
    /// Lenient parse of a backend's verdict word
    pub fn parse(word: &str) -> Self {
        match word.trim().to_lowercase().as_str() {
            "supported" | "support" | "verified" | "true" | "confirmed" => Verdict::Supported,
            "contradicted" | "refuted" | "false" | "disputed" => Verdict::Contradicted,
            _ => Verdict::Unclear,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Supported => "supported",
            Verdict::Contradicted => "contradicted",
            Verdict::Unclear => "unclear",
        })
    }
}

/// Graded match of one claim against external sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub verdict: Verdict,
    /// 0.0 - 1.0
    pub score: f64,
    #[serde(default)]
    pub support: String,
}

/// Verification result for one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceResult {
    pub claim_id: String,
    /// `None` when the unit failed or the reply skipped the claim
    pub evidence: Option<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyItem {
    index: usize,
    verdict: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    support: Option<String>,
}

/// Prompt covering a list of claims, numbered from 1
pub fn build_prompt(claims: &[&Claim]) -> String {
    let mut prompt = String::from(
        "Verify each numbered claim about the target company against external evidence.\n\
         Reply with a JSON array containing one object per claim:\n\
         {\"index\": <claim number>, \"verdict\": \"supported\" | \"contradicted\" | \"unclear\", \
         \"score\": <confidence 0-1>, \"support\": \"<short evidence summary>\"}\n\nClaims:\n",
    );
    for (position, claim) in claims.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", position + 1, claim.statement()));
    }
    prompt
}

/// Parse a reply into one slot per prompted claim
///
/// Prose around the array is ignored. Entries with out-of-range indices are
/// dropped; claims the reply does not mention stay `None`.
pub fn parse_reply(reply: &str, expected: usize) -> Result<Vec<Option<Evidence>>> {
    let (Some(start), Some(end)) = (reply.find('['), reply.rfind(']')) else {
        return Err(Error::ExternalCall("evidence reply contains no JSON array".to_string()));
    };
    if end < start {
        return Err(Error::ExternalCall("evidence reply contains no JSON array".to_string()));
    }
    let items: Vec<ReplyItem> = serde_json::from_str(&reply[start..=end])
        .map_err(|e| Error::ExternalCall(format!("unparseable evidence reply: {e}")))?;

    let mut slots = vec![None; expected];
    for item in items {
        let Some(slot) = item.index.checked_sub(1).and_then(|i| slots.get_mut(i)) else {
            debug!(index = item.index, "ignoring out-of-range evidence entry");
            continue;
        };
        let verdict = Verdict::parse(&item.verdict);
        let score = item
            .score
            .filter(|s| s.is_finite())
            .map_or(0.0, |s| s.clamp(0.0, 1.0));
        *slot = Some(Evidence {
            verdict,
            score,
            support: item.support.unwrap_or_default(),
        });
    }
    Ok(slots)
}

/// Drives verification through the executor and the verification cache
#[derive(Clone)]
pub struct ClaimVerifier {
    source: Arc<dyn EvidenceSource>,
    cache: TtlCache<serde_json::Value>,
    executor: BoundedExecutor,
    batch_size: usize,
}

impl ClaimVerifier {
    pub fn new(
        source: Arc<dyn EvidenceSource>,
        cache: TtlCache<serde_json::Value>,
        executor: BoundedExecutor,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            cache,
            executor,
            batch_size: batch_size.max(1),
        }
    }

    /// Cache key of a claim under this verifier's parameters
    ///
    /// Claim ids are left out so a repeated claim in a later run hits.
    pub fn fingerprint(&self, claim: &Claim) -> Result<Fingerprint> {
        Ok(Fingerprint::of(
            "verify_claim",
            &json!({
                "statement": claim.statement(),
                "key": claim.key(),
                "value": claim.value(),
                "source": self.source.name(),
                "prompt_version": PROMPT_VERSION,
            }),
        )?)
    }

    /// Verify every claim, one result per claim in input order
    pub async fn verify_all(&self, claims: &[Claim]) -> Vec<EvidenceResult> {
        let batches: Vec<&[Claim]> = claims.chunks(self.batch_size).collect();
        let units: Vec<_> = batches
            .iter()
            .map(|batch| move || self.verify_batch(batch))
            .collect();

        let report = self.executor.run_all("verify_claims", units).await;
        info!(
            claims = claims.len(),
            batches = report.len(),
            failed_batches = report.failed(),
            "verification complete"
        );

        let mut results = Vec::with_capacity(claims.len());
        for (batch, outcome) in batches.iter().zip(report.into_outcomes()) {
            match outcome.result {
                Ok(evidence) => {
                    for (claim, evidence) in batch.iter().zip(evidence) {
                        let failure = evidence
                            .is_none()
                            .then(|| "no verdict returned for claim".to_string());
                        results.push(EvidenceResult {
                            claim_id: claim.id().to_string(),
                            evidence,
                            failure,
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        batch = outcome.index,
                        attempts = outcome.attempts,
                        error = %e,
                        "verification batch failed"
                    );
                    let reason = if e.is_timeout() {
                        format!("verification timed out: {e}")
                    } else {
                        format!("verification failed: {e}")
                    };
                    results.extend(batch.iter().map(|claim| EvidenceResult {
                        claim_id: claim.id().to_string(),
                        evidence: None,
                        failure: Some(reason.clone()),
                    }));
                }
            }
        }
        results
    }

    async fn verify_batch(&self, batch: &[Claim]) -> Result<Vec<Option<Evidence>>> {
        let keys = batch
            .iter()
            .map(|claim| self.fingerprint(claim))
            .collect::<Result<Vec<_>>>()?;

        let cached = self
            .cache
            .get_or_compute_many(&keys, |missing| async move {
                let pending: Vec<&Claim> = missing.iter().map(|&i| &batch[i]).collect();
                let reply = self.source.query(&build_prompt(&pending)).await?;
                let parsed = parse_reply(&reply, pending.len())?;
                parsed
                    .into_iter()
                    .map(|evidence| {
                        evidence
                            .map(|e| serde_json::to_value(e).map_err(Error::from))
                            .transpose()
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .await?;

        cached
            .into_iter()
            .map(|value| {
                value
                    .map(|v| serde_json::from_value::<Evidence>(v).map_err(Error::from))
                    .transpose()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{ClaimCategory, ClaimValue};
    use async_trait::async_trait;
    use diligence_core::SectionKind;
    use diligence_runtime::{ExecutorConfig, RetryPolicy};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Answers every prompted claim as supported
    struct AlwaysSupported {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EvidenceSource for AlwaysSupported {
        async fn query(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let count = prompt
                .lines()
                .filter(|l| l.split_once(". ").is_some_and(|(n, _)| n.parse::<usize>().is_ok()))
                .count();
            let items: Vec<_> = (1..=count)
                .map(|i| {
                    json!({"index": i, "verdict": "supported", "score": 0.9, "support": "10-K"})
                })
                .collect();
            Ok(format!("Here you go:\n{}\nDone.", serde_json::Value::Array(items)))
        }

        fn name(&self) -> &str {
            "always-supported"
        }
    }

    mockall::mock! {
        Source {}

        #[async_trait]
        impl EvidenceSource for Source {
            async fn query(&self, prompt: &str) -> Result<String>;
            fn name(&self) -> &str;
        }
    }

    fn claims(n: usize) -> Vec<Claim> {
        (1..=n)
            .map(|i| {
                Claim::new(
                    format!("financial#{i}"),
                    "financial",
                    SectionKind::Financial,
                    ClaimCategory::Metric,
                    format!("metric_{i}"),
                    ClaimValue::Number(i as f64),
                )
            })
            .collect()
    }

    fn executor() -> BoundedExecutor {
        BoundedExecutor::new(ExecutorConfig {
            max_concurrency: 2,
            unit_timeout: Duration::from_millis(200),
            retry: RetryPolicy::no_retry(),
            rate_limit_per_second: None,
        })
        .unwrap()
    }

    #[test]
    fn test_parse_reply_tolerates_prose() {
        let reply = r#"Sure. [{"index": 2, "verdict": "Refuted", "score": 1.7},
            {"index": 1, "verdict": "supported", "score": 0.8, "support": "annual report"},
            {"index": 9, "verdict": "supported"}] Thanks"#;
        let parsed = parse_reply(reply, 3).unwrap();

        assert_eq!(parsed[0].as_ref().unwrap().verdict, Verdict::Supported);
        assert_eq!(parsed[0].as_ref().unwrap().support, "annual report");
        assert_eq!(parsed[1].as_ref().unwrap().verdict, Verdict::Contradicted);
        assert_eq!(parsed[1].as_ref().unwrap().score, 1.0);
        assert!(parsed[2].is_none());
    }

    #[test]
    fn test_parse_reply_rejects_garbage() {
        let err = parse_reply("no idea", 1).unwrap_err();
        assert!(err.is_retryable());
        assert!(parse_reply("[not json]", 1).is_err());
    }

    #[test]
    fn test_prompt_numbers_claims() {
        let claims = claims(2);
        let prompt = build_prompt(&claims.iter().collect::<Vec<_>>());
        assert!(prompt.contains("1. metric 1 = 1\n"));
        assert!(prompt.contains("2. metric 2 = 2\n"));
    }

    #[tokio::test]
    async fn test_batches_and_cache() {
        let source = Arc::new(AlwaysSupported {
            calls: AtomicU32::new(0),
        });
        let cache = TtlCache::new("verification", Duration::from_secs(60));
        let verifier = ClaimVerifier::new(source.clone(), cache, executor(), 5);
        let claims = claims(7);

        let results = verifier.verify_all(&claims).await;
        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|r| r.evidence.is_some()));
        assert_eq!(results[6].claim_id, "financial#7");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // Same claims again within TTL: served from cache
        let again = verifier.verify_all(&claims).await;
        assert_eq!(again, results);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_every_claim() {
        let mut source = MockSource::new();
        source
            .expect_query()
            .returning(|_| Err(Error::ExternalCall("503 from evidence backend".into())));
        source.expect_name().return_const("mock".to_string());

        let verifier = ClaimVerifier::new(
            Arc::new(source),
            TtlCache::new("verification", Duration::from_secs(60)),
            executor(),
            2,
        );

        let results = verifier.verify_all(&claims(3)).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.evidence.is_none()));
        assert!(results[2].failure.as_deref().unwrap().starts_with("verification failed"));
    }
}
