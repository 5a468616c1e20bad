//! Journal entry and line types
//!
//! A posted journal entry is immutable: its lines are never edited and
//! the only state transition is `Posted -> Reversed`, taken exactly once
//! when a mirror-image reversal entry is created. The reversal link is
//! an append-only relation (original -> reversal), recorded by the
//! store, not a mutable pointer on the posted row.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{AccountId, CustomerId, JournalEntryId, JournalLineId, OrgId, UserId, VendorId};

/// Lifecycle of a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Posted,
    Reversed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Posted => "posted",
            EntryStatus::Reversed => "reversed",
        }
    }
}

/// Party a receivable/payable line tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum PartyRef {
    Customer(CustomerId),
    Vendor(VendorId),
}

/// The document a journal entry was posted for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// e.g. "invoice", "payment", "credit_note", "journal_entry"
    pub kind: String,
    pub id: Uuid,
}

impl DocumentRef {
    pub fn new(kind: impl Into<String>, id: impl Into<Uuid>) -> Self {
        Self { kind: kind.into(), id: id.into() }
    }
}

/// An immutable posted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub org_id: OrgId,
    /// Sequence-derived number, e.g. `JRN-2024-25-0042`
    pub entry_number: String,
    pub date: NaiveDate,
    pub narration: String,
    pub reference: Option<DocumentRef>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub status: EntryStatus,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// One debit-or-credit leg of a journal entry
///
/// Exactly one of `debit`/`credit` is nonzero. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: JournalLineId,
    pub journal_entry_id: JournalEntryId,
    pub account_id: AccountId,
    pub debit: Decimal,
    pub credit: Decimal,
    pub party: Option<PartyRef>,
}

impl JournalLine {
    /// Net effect on the account's debit-positive running balance.
    pub fn balance_delta(&self) -> Decimal {
        self.debit - self.credit
    }
}
