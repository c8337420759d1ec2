//! Error types for calculations

use thiserror::Error;

/// Result type alias for calculations
pub type Result<T> = std::result::Result<T, CalcError>;

/// Calculation errors
///
/// Degenerate inputs are reported explicitly instead of producing `NaN`,
/// infinities, or a silent zero.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("{operation}: denominator `{name}` is zero")]
    ZeroDenominator {
        operation: &'static str,
        name: &'static str,
    },

    #[error("{operation}: denominator `{name}` is negative ({value})")]
    NegativeDenominator {
        operation: &'static str,
        name: &'static str,
        value: f64,
    },

    #[error("{operation}: invalid input `{name}`: {reason}")]
    InvalidInput {
        operation: &'static str,
        name: &'static str,
        reason: String,
    },

    #[error("{operation}: no values supplied")]
    EmptyInput { operation: &'static str },
}

impl From<CalcError> for diligence_core::Error {
    fn from(err: CalcError) -> Self {
        diligence_core::Error::Processing(err.to_string())
    }
}

/// Reject non-finite inputs
pub(crate) fn finite(operation: &'static str, name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::InvalidInput {
            operation,
            name,
            reason: format!("must be finite, got {value}"),
        })
    }
}

/// Require a strictly positive denominator
pub(crate) fn positive_denominator(
    operation: &'static str,
    name: &'static str,
    value: f64,
) -> Result<f64> {
    let value = finite(operation, name, value)?;
    if value == 0.0 {
        Err(CalcError::ZeroDenominator { operation, name })
    } else if value < 0.0 {
        Err(CalcError::NegativeDenominator {
            operation,
            name,
            value,
        })
    } else {
        Ok(value)
    }
}
