//! Journal entry invariant validation
//!
//! The single gate protecting ledger integrity. Called by the posting
//! engine before any persistence; pure, no side effects. Rules are
//! checked in order and each violation raises a distinct error kind.

use rust_decimal::Decimal;

use core_kernel::money;

use crate::error::LedgerError;

/// A proposed debit-or-credit leg, pre-persistence (unrounded inputs
/// are acceptable; sums are rounded before comparison).
#[derive(Debug, Clone, Copy)]
pub struct LineCandidate {
    pub debit: Decimal,
    pub credit: Decimal,
}

impl LineCandidate {
    pub fn debit(amount: Decimal) -> Self {
        Self { debit: amount, credit: Decimal::ZERO }
    }

    pub fn credit(amount: Decimal) -> Self {
        Self { debit: Decimal::ZERO, credit: amount }
    }
}

/// Validates a proposed set of ledger lines.
///
/// - At least 2 lines (fewer cannot balance).
/// - Exactly one of debit/credit strictly positive per line.
/// - `round2(sum(debit)) == round2(sum(credit))` exactly. Zero
///   tolerance here: the inputs are already-rounded postings, so any
///   epsilon would let real imbalances through.
pub fn validate_new_entry(lines: &[LineCandidate]) -> Result<(), LedgerError> {
    if lines.len() < 2 {
        return Err(LedgerError::EntryMinLines { count: lines.len() });
    }

    for (i, line) in lines.iter().enumerate() {
        let debit_set = line.debit > Decimal::ZERO;
        let credit_set = line.credit > Decimal::ZERO;
        let other_zero = if debit_set { line.credit.is_zero() } else { line.debit.is_zero() };
        if debit_set == credit_set || !other_zero {
            return Err(LedgerError::EntryLineShape { line: i });
        }
    }

    let debits = money::round2(lines.iter().map(|l| l.debit).sum());
    let credits = money::round2(lines.iter().map(|l| l.credit).sum());
    if debits != credits {
        return Err(LedgerError::EntryUnbalanced { debits, credits });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balanced_entry_passes() {
        let lines = [
            LineCandidate::debit(dec!(1180)),
            LineCandidate::credit(dec!(1000)),
            LineCandidate::credit(dec!(180)),
        ];
        assert!(validate_new_entry(&lines).is_ok());
    }

    #[test]
    fn test_minimum_lines() {
        assert!(matches!(
            validate_new_entry(&[]),
            Err(LedgerError::EntryMinLines { count: 0 })
        ));
        assert!(matches!(
            validate_new_entry(&[LineCandidate::debit(dec!(10))]),
            Err(LedgerError::EntryMinLines { count: 1 })
        ));
    }

    #[test]
    fn test_line_shape_both_sides_set() {
        let lines = [
            LineCandidate { debit: dec!(10), credit: dec!(10) },
            LineCandidate::credit(dec!(10)),
        ];
        assert!(matches!(
            validate_new_entry(&lines),
            Err(LedgerError::EntryLineShape { line: 0 })
        ));
    }

    #[test]
    fn test_line_shape_neither_side_set() {
        let lines = [
            LineCandidate::debit(dec!(10)),
            LineCandidate { debit: Decimal::ZERO, credit: Decimal::ZERO },
        ];
        assert!(matches!(
            validate_new_entry(&lines),
            Err(LedgerError::EntryLineShape { line: 1 })
        ));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let lines = [
            LineCandidate::debit(dec!(-10)),
            LineCandidate::credit(dec!(-10)),
        ];
        assert!(matches!(
            validate_new_entry(&lines),
            Err(LedgerError::EntryLineShape { line: 0 })
        ));
    }

    #[test]
    fn test_unbalanced_entry_rejected_exactly() {
        // One paisa off must fail: no epsilon in this check.
        let lines = [
            LineCandidate::debit(dec!(100.00)),
            LineCandidate::credit(dec!(100.01)),
        ];
        match validate_new_entry(&lines) {
            Err(LedgerError::EntryUnbalanced { debits, credits }) => {
                assert_eq!(debits, dec!(100.00));
                assert_eq!(credits, dec!(100.01));
            }
            other => panic!("expected EntryUnbalanced, got {other:?}"),
        }
    }

    #[test]
    fn test_unrounded_inputs_balance_after_rounding() {
        // Raw thirds that round to the same total on both sides.
        let lines = [
            LineCandidate::debit(dec!(33.333)),
            LineCandidate::debit(dec!(66.667)),
            LineCandidate::credit(dec!(100.0)),
        ];
        assert!(validate_new_entry(&lines).is_ok());
    }
}
