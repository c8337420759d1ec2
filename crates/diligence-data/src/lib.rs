//! Financial data boundary and quality gate
//!
//! Raw statements arrive from a [`FinancialDataSource`]. The [`QualityGate`]
//! excludes implausible periods from a normalized copy, records every
//! change in an adjustment ledger, and scores how much of the series
//! survived. Consumers then call [`NormalizedSeries::select_series`] which picks the
//! normalized or raw array based on that score and logs the choice.

pub mod error;
pub mod quality;
pub mod source;

pub use diligence_core::PeriodStatement;
pub use error::{DataError, Result};
pub use quality::{
    AdjustmentReason, AdjustmentRecord, NormalizedSeries, QualityGate, QualityGateConfig,
    SeriesSelection, SeriesSource,
};
pub use source::{DataKind, FinancialDataSource, StaticDataSource};
