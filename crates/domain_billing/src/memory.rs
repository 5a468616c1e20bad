//! In-memory settlement transaction
//!
//! Combines the ledger, series, and billing stores on one handle, the
//! in-process equivalent of a database transaction. Used by workflow
//! tests and embedded scenarios; the Postgres adapter lives in
//! `infra_db`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use core_kernel::{
    AccountId, AdvanceId, CreditNoteId, CustomerId, FiscalYear, InvoiceId, JournalEntryId, OrgId,
    PaymentId, StoreError,
};
use domain_ledger::{
    Account, GstChartOfAccounts, JournalEntry, JournalLine, LedgerStore, MemoryLedgerTx,
};
use domain_numbering::{DocModule, NumberSeries, SeriesStore};

use crate::advance::Advance;
use crate::allocation::{Allocation, AllocationSource};
use crate::credit_note::{CreditNote, CreditNoteStatus};
use crate::customer::{Customer, Organization};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::payment::Payment;
use crate::store::{
    BillingStore, CREDIT_NOTE_IDEMPOTENCY_CONSTRAINT, INVOICE_IDEMPOTENCY_CONSTRAINT,
    PAYMENT_IDEMPOTENCY_CONSTRAINT,
};

#[derive(Debug, Default)]
pub struct MemoryTx {
    pub ledger: MemoryLedgerTx,
    organizations: HashMap<OrgId, Organization>,
    customers: HashMap<CustomerId, Customer>,
    invoices: HashMap<InvoiceId, Invoice>,
    payments: HashMap<PaymentId, Payment>,
    credit_notes: HashMap<CreditNoteId, CreditNote>,
    advances: HashMap<AdvanceId, Advance>,
    allocations: Vec<Allocation>,
}

impl MemoryTx {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transaction seeded with the org, its standard chart of
    /// accounts, and any customers.
    pub fn for_org(org: Organization, customers: Vec<Customer>) -> Self {
        let mut tx = Self {
            ledger: MemoryLedgerTx::with_accounts(GstChartOfAccounts::standard(org.id)),
            ..Self::default()
        };
        tx.organizations.insert(org.id, org);
        for customer in customers {
            tx.customers.insert(customer.id, customer);
        }
        tx
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.len()
    }

    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }
}

#[async_trait]
impl BillingStore for MemoryTx {
    async fn get_organization(&mut self, org_id: OrgId) -> Result<Organization, StoreError> {
        self.organizations
            .get(&org_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Organization", org_id))
    }

    async fn get_customer(
        &mut self,
        org_id: OrgId,
        id: CustomerId,
    ) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .customers
            .get(&id)
            .filter(|c| c.org_id == org_id)
            .cloned())
    }

    async fn adjust_customer_balance(
        &mut self,
        org_id: OrgId,
        id: CustomerId,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        let customer = self
            .customers
            .get_mut(&id)
            .filter(|c| c.org_id == org_id)
            .ok_or_else(|| StoreError::not_found("Customer", id))?;
        customer.balance += delta;
        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError> {
        if let Some(key) = &invoice.idempotency_key {
            if self
                .invoices
                .values()
                .any(|i| i.org_id == invoice.org_id && i.idempotency_key.as_deref() == Some(key))
            {
                return Err(StoreError::conflict(
                    INVOICE_IDEMPOTENCY_CONSTRAINT,
                    format!("idempotency key {key} already used"),
                ));
            }
        }
        self.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    async fn get_invoice(
        &mut self,
        org_id: OrgId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .invoices
            .get(&id)
            .filter(|i| i.org_id == org_id)
            .cloned())
    }

    async fn find_invoice_by_idempotency_key(
        &mut self,
        org_id: OrgId,
        key: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .invoices
            .values()
            .find(|i| i.org_id == org_id && i.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn update_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError> {
        if !self.invoices.contains_key(&invoice.id) {
            return Err(StoreError::not_found("Invoice", invoice.id));
        }
        self.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    async fn set_invoice_settlement(
        &mut self,
        org_id: OrgId,
        id: InvoiceId,
        balance_due: Decimal,
        status: InvoiceStatus,
    ) -> Result<(), StoreError> {
        let invoice = self
            .invoices
            .get_mut(&id)
            .filter(|i| i.org_id == org_id)
            .ok_or_else(|| StoreError::not_found("Invoice", id))?;
        invoice.balance_due = balance_due;
        invoice.status = status;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: Payment) -> Result<(), StoreError> {
        if let Some(key) = &payment.idempotency_key {
            if self
                .payments
                .values()
                .any(|p| p.org_id == payment.org_id && p.idempotency_key.as_deref() == Some(key))
            {
                return Err(StoreError::conflict(
                    PAYMENT_IDEMPOTENCY_CONSTRAINT,
                    format!("idempotency key {key} already used"),
                ));
            }
        }
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get_payment(
        &mut self,
        org_id: OrgId,
        id: PaymentId,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .payments
            .get(&id)
            .filter(|p| p.org_id == org_id)
            .cloned())
    }

    async fn find_payment_by_idempotency_key(
        &mut self,
        org_id: OrgId,
        key: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .payments
            .values()
            .find(|p| p.org_id == org_id && p.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn insert_credit_note(&mut self, credit_note: CreditNote) -> Result<(), StoreError> {
        if let Some(key) = &credit_note.idempotency_key {
            if self.credit_notes.values().any(|cn| {
                cn.org_id == credit_note.org_id && cn.idempotency_key.as_deref() == Some(key)
            }) {
                return Err(StoreError::conflict(
                    CREDIT_NOTE_IDEMPOTENCY_CONSTRAINT,
                    format!("idempotency key {key} already used"),
                ));
            }
        }
        self.credit_notes.insert(credit_note.id, credit_note);
        Ok(())
    }

    async fn get_credit_note(
        &mut self,
        org_id: OrgId,
        id: CreditNoteId,
    ) -> Result<Option<CreditNote>, StoreError> {
        Ok(self
            .credit_notes
            .get(&id)
            .filter(|cn| cn.org_id == org_id)
            .cloned())
    }

    async fn find_credit_note_by_idempotency_key(
        &mut self,
        org_id: OrgId,
        key: &str,
    ) -> Result<Option<CreditNote>, StoreError> {
        Ok(self
            .credit_notes
            .values()
            .find(|cn| cn.org_id == org_id && cn.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn set_credit_note_application(
        &mut self,
        org_id: OrgId,
        id: CreditNoteId,
        balance: Decimal,
        status: CreditNoteStatus,
    ) -> Result<(), StoreError> {
        let credit_note = self
            .credit_notes
            .get_mut(&id)
            .filter(|cn| cn.org_id == org_id)
            .ok_or_else(|| StoreError::not_found("CreditNote", id))?;
        credit_note.balance = balance;
        credit_note.status = status;
        Ok(())
    }

    async fn insert_advance(&mut self, advance: Advance) -> Result<(), StoreError> {
        self.advances.insert(advance.id, advance);
        Ok(())
    }

    async fn get_advance(
        &mut self,
        org_id: OrgId,
        id: AdvanceId,
    ) -> Result<Option<Advance>, StoreError> {
        Ok(self
            .advances
            .get(&id)
            .filter(|a| a.org_id == org_id)
            .cloned())
    }

    async fn set_advance_balance(
        &mut self,
        org_id: OrgId,
        id: AdvanceId,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        let advance = self
            .advances
            .get_mut(&id)
            .filter(|a| a.org_id == org_id)
            .ok_or_else(|| StoreError::not_found("Advance", id))?;
        advance.balance = balance;
        Ok(())
    }

    async fn insert_allocation(&mut self, allocation: Allocation) -> Result<(), StoreError> {
        self.allocations.push(allocation);
        Ok(())
    }

    async fn find_allocations_for_source(
        &mut self,
        org_id: OrgId,
        source: AllocationSource,
    ) -> Result<Vec<Allocation>, StoreError> {
        Ok(self
            .allocations
            .iter()
            .filter(|a| a.org_id == org_id && a.source == source)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for MemoryTx {
    async fn find_account_by_code(
        &mut self,
        org_id: OrgId,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.ledger.find_account_by_code(org_id, code).await
    }

    async fn get_account(&mut self, org_id: OrgId, id: AccountId) -> Result<Account, StoreError> {
        self.ledger.get_account(org_id, id).await
    }

    async fn insert_account(&mut self, account: Account) -> Result<(), StoreError> {
        self.ledger.insert_account(account).await
    }

    async fn apply_balance_delta(
        &mut self,
        account_id: AccountId,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        self.ledger.apply_balance_delta(account_id, delta).await
    }

    async fn insert_journal_entry(
        &mut self,
        entry: JournalEntry,
        lines: Vec<JournalLine>,
    ) -> Result<(), StoreError> {
        self.ledger.insert_journal_entry(entry, lines).await
    }

    async fn get_journal_entry(
        &mut self,
        org_id: OrgId,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, StoreError> {
        self.ledger.get_journal_entry(org_id, id).await
    }

    async fn get_journal_lines(
        &mut self,
        entry_id: JournalEntryId,
    ) -> Result<Vec<JournalLine>, StoreError> {
        self.ledger.get_journal_lines(entry_id).await
    }

    async fn record_reversal(
        &mut self,
        org_id: OrgId,
        original: JournalEntryId,
        reversal: JournalEntryId,
    ) -> Result<(), StoreError> {
        self.ledger.record_reversal(org_id, original, reversal).await
    }

    async fn find_reversal_of(
        &mut self,
        org_id: OrgId,
        original: JournalEntryId,
    ) -> Result<Option<JournalEntryId>, StoreError> {
        self.ledger.find_reversal_of(org_id, original).await
    }
}

#[async_trait]
impl SeriesStore for MemoryTx {
    async fn find_series(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
    ) -> Result<Option<NumberSeries>, StoreError> {
        self.ledger.find_series(org_id, module, fiscal_year).await
    }

    async fn insert_series(&mut self, series: NumberSeries) -> Result<(), StoreError> {
        self.ledger.insert_series(series).await
    }

    async fn set_current_number(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
        current_number: i64,
    ) -> Result<(), StoreError> {
        self.ledger
            .set_current_number(org_id, module, fiscal_year, current_number)
            .await
    }
}
