//! Allocations: source-to-invoice settlement links

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AdvanceId, AllocationId, CreditNoteId, InvoiceId, OrgId, PaymentId};

/// Where settled money came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum AllocationSource {
    Payment(PaymentId),
    CreditNote(CreditNoteId),
    Advance(AdvanceId),
}

impl fmt::Display for AllocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationSource::Payment(id) => write!(f, "payment {id}"),
            AllocationSource::CreditNote(id) => write!(f, "credit note {id}"),
            AllocationSource::Advance(id) => write!(f, "advance {id}"),
        }
    }
}

/// One settled amount, linking a source to a destination invoice.
///
/// The sum of allocations against a source never exceeds the source's
/// available balance; the sum against an invoice never exceeds its
/// total. Both caps are enforced before anything is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub org_id: OrgId,
    pub source: AllocationSource,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub allocated_at: DateTime<Utc>,
}

/// A credit source named by the caller when settling an invoice.
///
/// `amount: None` means "use as much of this source as the invoice
/// still needs".
#[derive(Debug, Clone, Copy)]
pub struct CreditSourceRequest {
    pub source: CreditSource,
    pub amount: Option<Decimal>,
}

/// Non-cash sources applicable against an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditSource {
    CreditNote(CreditNoteId),
    Advance(AdvanceId),
}
