//! Billing store port
//!
//! Persistence surface for financial documents and denormalized
//! balances, scoped to the caller's transaction like the ledger and
//! series ports. Balance changes go through atomic-delta updates, never
//! read-modify-write in workflow code.

use async_trait::async_trait;
use rust_decimal::Decimal;

use core_kernel::{AdvanceId, CreditNoteId, CustomerId, InvoiceId, OrgId, PaymentId, StoreError};
use domain_ledger::LedgerStore;
use domain_numbering::SeriesStore;

use crate::advance::Advance;
use crate::allocation::{Allocation, AllocationSource};
use crate::credit_note::{CreditNote, CreditNoteStatus};
use crate::customer::{Customer, Organization};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::payment::Payment;

/// Unique-constraint names the idempotency backstop matches on.
pub const INVOICE_IDEMPOTENCY_CONSTRAINT: &str = "invoices_org_idempotency_key";
pub const PAYMENT_IDEMPOTENCY_CONSTRAINT: &str = "payments_org_idempotency_key";
pub const CREDIT_NOTE_IDEMPOTENCY_CONSTRAINT: &str = "credit_notes_org_idempotency_key";

#[async_trait]
pub trait BillingStore: Send {
    async fn get_organization(&mut self, org_id: OrgId) -> Result<Organization, StoreError>;

    async fn get_customer(
        &mut self,
        org_id: OrgId,
        id: CustomerId,
    ) -> Result<Option<Customer>, StoreError>;

    /// Atomically adds `delta` to the customer's running balance.
    async fn adjust_customer_balance(
        &mut self,
        org_id: OrgId,
        id: CustomerId,
        delta: Decimal,
    ) -> Result<(), StoreError>;

    /// Conflicts on a duplicate `(org, idempotency_key)`.
    async fn insert_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError>;

    async fn get_invoice(
        &mut self,
        org_id: OrgId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError>;

    async fn find_invoice_by_idempotency_key(
        &mut self,
        org_id: OrgId,
        key: &str,
    ) -> Result<Option<Invoice>, StoreError>;

    /// Full-row update; used for draft edits and issuance.
    async fn update_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError>;

    async fn set_invoice_settlement(
        &mut self,
        org_id: OrgId,
        id: InvoiceId,
        balance_due: Decimal,
        status: InvoiceStatus,
    ) -> Result<(), StoreError>;

    /// Conflicts on a duplicate `(org, idempotency_key)`.
    async fn insert_payment(&mut self, payment: Payment) -> Result<(), StoreError>;

    async fn get_payment(
        &mut self,
        org_id: OrgId,
        id: PaymentId,
    ) -> Result<Option<Payment>, StoreError>;

    async fn find_payment_by_idempotency_key(
        &mut self,
        org_id: OrgId,
        key: &str,
    ) -> Result<Option<Payment>, StoreError>;

    /// Conflicts on a duplicate `(org, idempotency_key)`.
    async fn insert_credit_note(&mut self, credit_note: CreditNote) -> Result<(), StoreError>;

    async fn get_credit_note(
        &mut self,
        org_id: OrgId,
        id: CreditNoteId,
    ) -> Result<Option<CreditNote>, StoreError>;

    async fn find_credit_note_by_idempotency_key(
        &mut self,
        org_id: OrgId,
        key: &str,
    ) -> Result<Option<CreditNote>, StoreError>;

    async fn set_credit_note_application(
        &mut self,
        org_id: OrgId,
        id: CreditNoteId,
        balance: Decimal,
        status: CreditNoteStatus,
    ) -> Result<(), StoreError>;

    async fn insert_advance(&mut self, advance: Advance) -> Result<(), StoreError>;

    async fn get_advance(
        &mut self,
        org_id: OrgId,
        id: AdvanceId,
    ) -> Result<Option<Advance>, StoreError>;

    async fn set_advance_balance(
        &mut self,
        org_id: OrgId,
        id: AdvanceId,
        balance: Decimal,
    ) -> Result<(), StoreError>;

    async fn insert_allocation(&mut self, allocation: Allocation) -> Result<(), StoreError>;

    /// All allocations made from one source, in insertion order.
    async fn find_allocations_for_source(
        &mut self,
        org_id: OrgId,
        source: AllocationSource,
    ) -> Result<Vec<Allocation>, StoreError>;
}

/// Everything a settlement workflow needs from one transaction handle.
pub trait SettlementTx: LedgerStore + SeriesStore + BillingStore {}

impl<T: LedgerStore + SeriesStore + BillingStore + ?Sized> SettlementTx for T {}
