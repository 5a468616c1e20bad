//! Tax domain errors

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during GST calculation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaxError {
    /// Quantity or rate is negative
    #[error("Negative {field}: {value}")]
    NegativeInput { field: &'static str, value: Decimal },

    /// GST rate outside the 0..=100 percent range
    #[error("GST rate out of range: {0}")]
    GstRateOutOfRange(Decimal),
}
