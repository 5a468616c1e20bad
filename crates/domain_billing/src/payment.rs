//! Customer payments

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{CustomerId, JournalEntryId, OrgId, PaymentId};

/// How the money arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Upi,
    Card,
    Cheque,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Card => "card",
            PaymentMethod::Cheque => "cheque",
        }
    }
}

/// A received customer payment.
///
/// The full amount is posted as a cash receipt; the portion not
/// allocated to invoices is banked as an advance, so a payment row
/// itself carries no running balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub org_id: OrgId,
    pub customer_id: CustomerId,
    pub payment_number: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub method: PaymentMethod,
    /// External reference: bank ref, UPI transaction ID
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
    pub journal_entry_id: Option<JournalEntryId>,
    pub created_at: DateTime<Utc>,
}
