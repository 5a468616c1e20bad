//! Ledger domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{JournalEntryId, StoreError};
use domain_numbering::SeriesError;

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A line references an account code not in the org's chart
    #[error("Account not found: {code}")]
    AccountNotFound { code: String },

    /// A journal entry needs at least two lines to balance
    #[error("Journal entry requires at least 2 lines, got {count}")]
    EntryMinLines { count: usize },

    /// A line must have exactly one of debit/credit strictly positive
    #[error("Journal line {line} must have exactly one of debit or credit positive")]
    EntryLineShape { line: usize },

    /// Debits and credits do not match exactly after rounding
    #[error("Unbalanced journal entry: debits={debits}, credits={credits}")]
    EntryUnbalanced { debits: Decimal, credits: Decimal },

    /// Referenced journal entry does not exist
    #[error("Journal entry not found: {0}")]
    EntryNotFound(JournalEntryId),

    /// Reversal was already performed for this entry
    #[error("Journal entry already reversed: {0}")]
    AlreadyReversed(JournalEntryId),

    /// Number allocation failed
    #[error(transparent)]
    Numbering(#[from] SeriesError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Financial-rule violations that valid input should never reach.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::EntryMinLines { .. }
                | LedgerError::EntryLineShape { .. }
                | LedgerError::EntryUnbalanced { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::AccountNotFound { .. } | LedgerError::EntryNotFound(_)
        ) || matches!(self, LedgerError::Store(e) if e.is_not_found())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::AlreadyReversed(_))
            || matches!(self, LedgerError::Store(e) if e.is_unique_violation())
    }
}
