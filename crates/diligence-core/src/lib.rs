//! Core abstractions for diligence-rs
//!
//! This crate defines the fundamental types shared by every stage
//! of a diligence run: the [`RunState`] slot store that agents read from, the
//! typed [`AgentOutput`] variants they produce, the [`AgentStatus`] lifecycle
//! and the error taxonomy.

pub mod agent;
pub mod error;
pub mod output;
pub mod state;

pub use agent::{AgentResult, AgentStatus};
pub use error::{Error, Result};
pub use output::{
    AgentOutput, CalculationRecord, Extra, FinancialOutput, Finding, GeneralOutput, LegalOutput,
    MarketOutput, PeriodStatement, RiskOutput, SectionKind, ValuationOutput,
};
pub use state::{Provenance, RunState, Slot, SlotValue, keys};
