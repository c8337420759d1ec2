//! Claim pipeline and consolidated record
//!
//! [`ClaimPipeline::run`] turns the final run state into one
//! [`ConsolidatedRecord`]:
//!
//! 1. extract claims from every completed agent's typed output
//! 2. classify them into priority tiers and cap them per agent
//! 3. merge duplicates across agents, keeping the most confident source
//! 4. verify the survivors in batches on the bounded executor, through the
//!    verification cache
//! 5. resolve numeric conflicts statistically with the calculator
//! 6. assemble sections with source and confidence tags
//!
//! The [`ClaimLedger`] inside the record accounts for every claim's fate,
//! and [`RecordStore`] persists the record once per run.

pub mod claim;
pub mod dedupe;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod ledger;
pub mod pipeline;
pub mod prioritize;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod verify;

pub use claim::{Claim, ClaimCategory, ClaimValue, Priority, VerificationStatus};
pub use error::{ClaimError, Result};
pub use fallback::{FallbackResolver, Resolved};
pub use ledger::{ClaimFate, ClaimLedger, LedgerEntry, LedgerSummary};
pub use pipeline::{ClaimPipeline, ClaimsConfig, SynthesisInput};
pub use prioritize::{PriorityKeywords, PriorityRules};
pub use reconcile::{ConflictInput, NumericConflict};
pub use record::{
    AgentSummary, ConsolidatedRecord, FieldValue, RecordEntry, Section, SectionStatus,
    SeriesSummary, ValueSource,
};
pub use store::{PersistOutcome, RecordStore};
pub use verify::{ClaimVerifier, Evidence, EvidenceResult, Verdict};
