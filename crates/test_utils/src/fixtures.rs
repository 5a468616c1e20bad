//! Deterministic fixtures
//!
//! Fixed UUIDs and a mid-fiscal-year reference date so tests get
//! predictable document numbers and stable identities across runs.

use chrono::NaiveDate;
use uuid::Uuid;

use core_kernel::{CustomerId, OrgId};
use domain_billing::{Customer, MemoryTx, Organization};

/// July 15, 2024: mid FY 2024-25, away from the April boundary.
pub fn mid_fiscal_year() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 15).expect("valid date")
}

/// Last day of FY 2023-24.
pub fn fiscal_year_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 31).expect("valid date")
}

/// First day of FY 2024-25.
pub fn fiscal_year_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, 1).expect("valid date")
}

/// A Maharashtra (state 27) organization with GST-exclusive pricing.
pub fn organization() -> Organization {
    Organization {
        id: OrgId::from_uuid(Uuid::from_u128(0xA0)),
        name: "Acme Traders".to_string(),
        gstin: Some("27AAAAA0000A1Z5".to_string()),
        state_code: "27".to_string(),
        prices_include_gst: false,
    }
}

/// A customer in the organization's own state (CGST/SGST supplies).
pub fn intra_state_customer(org_id: OrgId) -> Customer {
    Customer {
        id: CustomerId::from_uuid(Uuid::from_u128(0xB0)),
        org_id,
        name: "Sharma Industries".to_string(),
        gstin: Some("27BBBBB0000B1Z4".to_string()),
        state_code: "27".to_string(),
        balance: rust_decimal::Decimal::ZERO,
    }
}

/// A Delhi (state 07) customer, making supplies inter-state (IGST).
pub fn inter_state_customer(org_id: OrgId) -> Customer {
    Customer {
        id: CustomerId::from_uuid(Uuid::from_u128(0xB1)),
        org_id,
        name: "Kapoor Exports".to_string(),
        gstin: Some("07CCCCC0000C1Z3".to_string()),
        state_code: "07".to_string(),
        balance: rust_decimal::Decimal::ZERO,
    }
}

/// An in-memory transaction seeded with the standard chart of accounts,
/// the fixture organization, and both fixture customers.
///
/// Returns the tx plus the ids needed by most workflow tests.
pub fn seeded_tx() -> (MemoryTx, OrgId, CustomerId) {
    let org = organization();
    let org_id = org.id;
    let customer = intra_state_customer(org_id);
    let customer_id = customer.id;
    let tx = MemoryTx::for_org(org, vec![customer, inter_state_customer(org_id)]);
    (tx, org_id, customer_id)
}
