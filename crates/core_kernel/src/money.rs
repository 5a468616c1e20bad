//! Money arithmetic with precise decimal rounding
//!
//! All monetary values in the ledger are rupee amounts held as
//! `rust_decimal::Decimal` and rounded to 2 decimal places with half-up
//! semantics. Every sum, difference, and product in the system routes
//! through these helpers so that cent-level drift cannot accumulate
//! across many line items.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Tolerance for balance comparisons (one paisa).
///
/// Absorbs rounding noise from decimal division, e.g. GST-inclusive
/// back-calculation. Balance validation of journal entries deliberately
/// does NOT use this tolerance; see `domain_ledger::validation`.
pub const EPSILON: Decimal = dec!(0.01);

/// Rounds to 2 decimal places, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sums a slice of amounts and rounds the result to 2 decimal places.
pub fn add(values: &[Decimal]) -> Decimal {
    round2(values.iter().copied().sum())
}

/// Subtracts `b` from `a`, rounded to 2 decimal places.
pub fn subtract(a: Decimal, b: Decimal) -> Decimal {
    round2(a - b)
}

/// Multiplies two amounts, rounded to 2 decimal places.
pub fn multiply(a: Decimal, b: Decimal) -> Decimal {
    round2(a * b)
}

/// Divides `a` by `b`, rounded to 2 decimal places.
///
/// Division by zero is a defined zero result here, not an error: a zero
/// divisor only ever arises from zero-quantity or zero-rate lines, whose
/// correct monetary contribution is zero.
pub fn divide(a: Decimal, b: Decimal) -> Decimal {
    if b.is_zero() {
        return Decimal::ZERO;
    }
    round2(a / b)
}

/// Compares two amounts within [`EPSILON`].
pub fn equals_within_epsilon(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= EPSILON
}

/// Returns true when the amount is within [`EPSILON`] of zero.
pub fn is_effectively_zero(value: Decimal) -> bool {
    value.abs() <= EPSILON
}

/// Returns true when `a` exceeds `b` by more than [`EPSILON`].
pub fn exceeds(a: Decimal, b: Decimal) -> bool {
    a > b + EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2_half_up() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(1.004)), dec!(1.00));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round2(dec!(2.675)), dec!(2.68));
    }

    #[test]
    fn test_add_rounds_result() {
        assert_eq!(add(&[dec!(0.333), dec!(0.333), dec!(0.334)]), dec!(1.00));
        assert_eq!(add(&[]), dec!(0));
    }

    #[test]
    fn test_subtract() {
        assert_eq!(subtract(dec!(118), dec!(100)), dec!(18.00));
    }

    #[test]
    fn test_divide_by_zero_is_zero() {
        assert_eq!(divide(dec!(100), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(divide(dec!(100), dec!(3)), dec!(33.33));
    }

    #[test]
    fn test_epsilon_comparisons() {
        assert!(equals_within_epsilon(dec!(100.00), dec!(100.01)));
        assert!(!equals_within_epsilon(dec!(100.00), dec!(100.02)));
        assert!(is_effectively_zero(dec!(0.01)));
        assert!(!is_effectively_zero(dec!(0.02)));
        assert!(exceeds(dec!(100.02), dec!(100.00)));
        assert!(!exceeds(dec!(100.01), dec!(100.00)));
    }
}
