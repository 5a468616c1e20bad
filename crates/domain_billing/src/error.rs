//! Billing error taxonomy

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{AdvanceId, CreditNoteId, CustomerId, InvoiceId, StoreError};
use domain_ledger::LedgerError;
use domain_numbering::SeriesError;
use domain_tax::TaxError;

use crate::invoice::InvoiceStatus;

/// Coarse classification callers map to transport-level responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, recoverable by correcting the request
    Validation,
    /// A financial rule would be violated; not reachable by valid input
    Invariant,
    /// Duplicate / unique-constraint collision
    Conflict,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("{field} must be positive, got {value}")]
    AmountNotPositive { field: &'static str, value: Decimal },

    #[error("an invoice needs at least one line")]
    EmptyLines,

    #[error("invoice {0} not found")]
    InvoiceNotFound(InvoiceId),

    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error("credit note {0} not found")]
    CreditNoteNotFound(CreditNoteId),

    #[error("advance {0} not found")]
    AdvanceNotFound(AdvanceId),

    #[error("invoice is {status}, expected a draft")]
    InvoiceNotDraft { status: InvoiceStatus },

    #[error("invoice is {status}, not open for settlement")]
    InvoiceNotOpen { status: InvoiceStatus },

    #[error("invoice is {status} and cannot be cancelled; unwind settlements first")]
    CannotCancel { status: InvoiceStatus },

    /// An issued invoice must always carry its posting.
    #[error("issued invoice {0} has no journal entry")]
    MissingJournalEntry(InvoiceId),

    #[error("requested allocations ({requested}) exceed the invoice balance due ({balance_due})")]
    OverAllocation { requested: Decimal, balance_due: Decimal },

    #[error("requested {requested} exceeds the source balance {available}")]
    SourceInsufficient { requested: Decimal, available: Decimal },

    #[error("requested allocations ({requested}) exceed the payment amount ({amount})")]
    AllocationExceedsPayment { requested: Decimal, amount: Decimal },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Numbering(#[from] SeriesError),

    #[error(transparent)]
    Tax(#[from] TaxError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BillingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::AmountNotPositive { .. }
            | BillingError::EmptyLines
            | BillingError::InvoiceNotDraft { .. }
            | BillingError::InvoiceNotOpen { .. }
            | BillingError::CannotCancel { .. }
            | BillingError::OverAllocation { .. }
            | BillingError::SourceInsufficient { .. }
            | BillingError::AllocationExceedsPayment { .. }
            | BillingError::Tax(_) => ErrorKind::Validation,

            BillingError::MissingJournalEntry(_) => ErrorKind::Invariant,

            BillingError::InvoiceNotFound(_)
            | BillingError::CustomerNotFound(_)
            | BillingError::CreditNoteNotFound(_)
            | BillingError::AdvanceNotFound(_) => ErrorKind::NotFound,

            BillingError::Ledger(err) => {
                if err.is_invariant_violation() {
                    ErrorKind::Invariant
                } else if err.is_not_found() {
                    ErrorKind::NotFound
                } else if err.is_conflict() {
                    ErrorKind::Conflict
                } else {
                    ErrorKind::Internal
                }
            }
            BillingError::Numbering(SeriesError::UnknownModule(_)) => ErrorKind::Validation,
            BillingError::Numbering(SeriesError::Store(err)) => store_kind(err),
            BillingError::Store(err) => store_kind(err),
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

fn store_kind(err: &StoreError) -> ErrorKind {
    if err.is_not_found() {
        ErrorKind::NotFound
    } else if err.is_unique_violation() {
        ErrorKind::Conflict
    } else {
        ErrorKind::Internal
    }
}
