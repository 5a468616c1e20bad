//! Organization and customer records
//!
//! Only the fields the ledger core depends on: GST state codes decide
//! the CGST/SGST vs IGST split, the org default decides inclusive
//! pricing, and the customer row carries a running receivable balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{CustomerId, OrgId};

/// The tenant. `state_code` is the two-digit GST state code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub gstin: Option<String>,
    pub state_code: String,
    /// Default pricing mode for documents that don't set one
    pub prices_include_gst: bool,
}

/// A customer with a running receivable balance.
///
/// The balance is denormalized: increased on invoice issuance, decreased
/// by settlements and credit notes, always inside the same transaction
/// as the journal entry that moves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub org_id: OrgId,
    pub name: String,
    pub gstin: Option<String>,
    pub state_code: String,
    pub balance: Decimal,
}

impl Customer {
    pub fn new(org_id: OrgId, name: impl Into<String>, state_code: impl Into<String>) -> Self {
        Self {
            id: CustomerId::new(),
            org_id,
            name: name.into(),
            gstin: None,
            state_code: state_code.into(),
            balance: Decimal::ZERO,
        }
    }
}

/// Supply is inter-state when the customer's state differs from the org's.
pub fn is_inter_state(org: &Organization, customer: &Customer) -> bool {
    org.state_code != customer.state_code
}
