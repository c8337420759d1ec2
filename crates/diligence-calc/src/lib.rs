//! Deterministic calculation library
//!
//! Every numeric result used by the synthesis stage comes from here. All
//! functions are pure: no I/O, no shared mutable state, and identical
//! inputs always produce identical output and step trace. Each returns a
//! [`Calculation`] carrying the result, a methodology string, and the
//! ordered steps that produced it.

pub mod calculation;
pub mod calculator;
pub mod error;
pub mod growth;
pub mod stats;
pub mod valuation;

pub use calculation::{CalcStep, Calculation, Operation};
pub use calculator::{Calculator, CalculatorConfig};
pub use error::{CalcError, Result};
pub use growth::{cagr, project_growth};
pub use stats::{ConflictStrategy, DescriptiveStats, descriptive_stats, resolve_conflict};
pub use valuation::{
    DcfInputs, DcfOutput, LboInputs, LboOutput, SynergyInputs, SynergyOutput, SynergyYear,
    WaccInputs, WaccOutput,
};
