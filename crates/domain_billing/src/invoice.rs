//! GST invoices

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use core_kernel::{money, CustomerId, InvoiceId, JournalEntryId, OrgId};
use domain_tax::LineTaxBreakdown;

/// Invoice lifecycle
///
/// Drafts carry no ledger effect; issuing posts the journal entry, and
/// the only way out of `Issued`/`PartiallyPaid` is settlement or a
/// cancelling reversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// Open for settlement: allocations may still be applied.
    pub fn is_open(&self) -> bool {
        matches!(self, InvoiceStatus::Issued | InvoiceStatus::PartiallyPaid)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invoice line with its computed GST breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub gst_rate: Decimal,
    pub amount: Decimal,
    pub taxable_amount: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total: Decimal,
}

impl InvoiceLine {
    pub fn from_breakdown(
        id: Uuid,
        description: impl Into<String>,
        quantity: Decimal,
        rate: Decimal,
        gst_rate: Decimal,
        breakdown: &LineTaxBreakdown,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            quantity,
            rate,
            gst_rate,
            amount: breakdown.amount,
            taxable_amount: breakdown.taxable_amount,
            cgst: breakdown.cgst,
            sgst: breakdown.sgst,
            igst: breakdown.igst,
            total: breakdown.total,
        }
    }
}

/// A GST invoice.
///
/// `invoice_number` stays `None` while drafting; it is allocated (or
/// accepted manually) at issuance. `balance_due` is decremented by
/// allocations and stays within `[-epsilon, total + epsilon]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub org_id: OrgId,
    pub customer_id: CustomerId,
    pub invoice_number: Option<String>,
    pub date: NaiveDate,
    pub status: InvoiceStatus,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total: Decimal,
    pub balance_due: Decimal,
    pub is_inter_state: bool,
    pub prices_include_gst: bool,
    pub idempotency_key: Option<String>,
    pub journal_entry_id: Option<JournalEntryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Status implied by the remaining balance after an allocation.
    pub fn settled_status(&self) -> InvoiceStatus {
        if money::is_effectively_zero(self.balance_due) {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::PartiallyPaid
        }
    }
}
