//! Credit notes

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{money, CreditNoteId, CustomerId, InvoiceId, JournalEntryId, OrgId};

use crate::invoice::InvoiceLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditNoteStatus {
    Issued,
    PartiallyApplied,
    Applied,
    Cancelled,
}

impl CreditNoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditNoteStatus::Issued => "issued",
            CreditNoteStatus::PartiallyApplied => "partially_applied",
            CreditNoteStatus::Applied => "applied",
            CreditNoteStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CreditNoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credit issued to a customer, applicable against future invoices.
///
/// Issuance posts the reversing-style journal entry up front; applying
/// the note later only moves document balances, never the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditNote {
    pub id: CreditNoteId,
    pub org_id: OrgId,
    pub customer_id: CustomerId,
    pub credit_note_number: String,
    /// Invoice this note was raised against, if any
    pub invoice_id: Option<InvoiceId>,
    pub reason: Option<String>,
    pub date: NaiveDate,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total: Decimal,
    /// Amount still available for application
    pub balance: Decimal,
    pub status: CreditNoteStatus,
    pub idempotency_key: Option<String>,
    pub journal_entry_id: Option<JournalEntryId>,
    pub created_at: DateTime<Utc>,
}

impl CreditNote {
    /// Status implied by the remaining balance after an application.
    pub fn applied_status(&self) -> CreditNoteStatus {
        if money::is_effectively_zero(self.balance) {
            CreditNoteStatus::Applied
        } else {
            CreditNoteStatus::PartiallyApplied
        }
    }
}
