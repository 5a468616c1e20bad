//! Transaction-scoped Postgres adapter
//!
//! One `PgTx` wraps one database transaction and implements every store
//! port, so a settlement workflow runs its numbering, posting, and
//! document writes against the same transaction and commits or rolls
//! back as a unit. Queries are runtime-bound; balances move through
//! atomic `balance = balance + delta` updates and number-series rows are
//! locked with `FOR UPDATE` while held.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use core_kernel::{
    AccountId, AdvanceId, CreditNoteId, CustomerId, FiscalYear, InvoiceId, JournalEntryId,
    JournalLineId, OrgId, PaymentId, StoreError, UserId, VendorId,
};
use domain_billing::{
    Advance, Allocation, AllocationSource, BillingStore, CreditNote, CreditNoteStatus, Customer,
    Invoice, InvoiceLine, InvoiceStatus, Organization, Payment, PaymentMethod,
};
use domain_ledger::{
    Account, AccountType, DocumentRef, EntryStatus, JournalEntry, JournalLine, LedgerStore,
    PartyRef,
};
use domain_numbering::{DocModule, NumberSeries, SeriesStore};

use crate::error::map_sqlx;

/// A live database transaction implementing all store ports.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    pub async fn begin(pool: &PgPool) -> Result<Self, StoreError> {
        Ok(Self { tx: pool.begin().await.map_err(map_sqlx)? })
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_sqlx)
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(map_sqlx)
    }
}

#[async_trait]
impl LedgerStore for PgTx {
    async fn find_account_by_code(
        &mut self,
        org_id: OrgId,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT id, org_id, code, name, account_type, balance
             FROM accounts WHERE org_id = $1 AND code = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn get_account(&mut self, org_id: OrgId, id: AccountId) -> Result<Account, StoreError> {
        let row = sqlx::query(
            "SELECT id, org_id, code, name, account_type, balance
             FROM accounts WHERE org_id = $1 AND id = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref()
            .map(account_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("Account", id))
    }

    async fn insert_account(&mut self, account: Account) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accounts (id, org_id, code, name, account_type, balance)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*account.id.as_uuid())
        .bind(*account.org_id.as_uuid())
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(account.balance)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn apply_balance_delta(
        &mut self,
        account_id: AccountId,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
            .bind(delta)
            .bind(*account_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Account", account_id));
        }
        Ok(())
    }

    async fn insert_journal_entry(
        &mut self,
        entry: JournalEntry,
        lines: Vec<JournalLine>,
    ) -> Result<(), StoreError> {
        let (reference_kind, reference_id) = match &entry.reference {
            Some(r) => (Some(r.kind.as_str()), Some(r.id)),
            None => (None, None),
        };
        sqlx::query(
            "INSERT INTO journal_entries
                 (id, org_id, entry_number, date, narration, reference_kind, reference_id,
                  total_debit, total_credit, status, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.org_id.as_uuid())
        .bind(&entry.entry_number)
        .bind(entry.date)
        .bind(&entry.narration)
        .bind(reference_kind)
        .bind(reference_id)
        .bind(entry.total_debit)
        .bind(entry.total_credit)
        .bind(entry.status.as_str())
        .bind(entry.created_by.map(|u| *u.as_uuid()))
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        for line in &lines {
            let (party_kind, party_id) = party_parts(line.party);
            sqlx::query(
                "INSERT INTO journal_lines
                     (id, journal_entry_id, account_id, debit, credit, party_kind, party_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(*line.id.as_uuid())
            .bind(*line.journal_entry_id.as_uuid())
            .bind(*line.account_id.as_uuid())
            .bind(line.debit)
            .bind(line.credit)
            .bind(party_kind)
            .bind(party_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        }
        Ok(())
    }

    async fn get_journal_entry(
        &mut self,
        org_id: OrgId,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT id, org_id, entry_number, date, narration, reference_kind, reference_id,
                    total_debit, total_credit, status, created_by, created_at
             FROM journal_entries WHERE org_id = $1 AND id = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(journal_entry_from_row).transpose()
    }

    async fn get_journal_lines(
        &mut self,
        entry_id: JournalEntryId,
    ) -> Result<Vec<JournalLine>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, journal_entry_id, account_id, debit, credit, party_kind, party_id
             FROM journal_lines WHERE journal_entry_id = $1 ORDER BY seq",
        )
        .bind(*entry_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(journal_line_from_row).collect()
    }

    async fn record_reversal(
        &mut self,
        org_id: OrgId,
        original: JournalEntryId,
        reversal: JournalEntryId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO journal_reversals (org_id, original_entry_id, reversal_entry_id)
             VALUES ($1, $2, $3)",
        )
        .bind(*org_id.as_uuid())
        .bind(*original.as_uuid())
        .bind(*reversal.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        let result = sqlx::query(
            "UPDATE journal_entries SET status = 'reversed' WHERE org_id = $1 AND id = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(*original.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("JournalEntry", original));
        }
        Ok(())
    }

    async fn find_reversal_of(
        &mut self,
        org_id: OrgId,
        original: JournalEntryId,
    ) -> Result<Option<JournalEntryId>, StoreError> {
        let row = sqlx::query(
            "SELECT reversal_entry_id FROM journal_reversals
             WHERE org_id = $1 AND original_entry_id = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(*original.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.map(|r| {
            let id: Uuid = r.try_get("reversal_entry_id").map_err(map_sqlx)?;
            Ok(JournalEntryId::from_uuid(id))
        })
        .transpose()
    }
}

#[async_trait]
impl SeriesStore for PgTx {
    async fn find_series(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
    ) -> Result<Option<NumberSeries>, StoreError> {
        // Row lock held until commit: concurrent allocators for the same
        // key serialize here.
        let row = sqlx::query(
            "SELECT prefix, current_number FROM number_series
             WHERE org_id = $1 AND module = $2 AND fiscal_year_start = $3
             FOR UPDATE",
        )
        .bind(*org_id.as_uuid())
        .bind(module.as_str())
        .bind(fiscal_year.start_year())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.map(|r| {
            Ok(NumberSeries {
                org_id,
                module,
                fiscal_year,
                prefix: r.try_get("prefix").map_err(map_sqlx)?,
                current_number: r.try_get("current_number").map_err(map_sqlx)?,
            })
        })
        .transpose()
    }

    async fn insert_series(&mut self, series: NumberSeries) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO number_series (org_id, module, fiscal_year_start, prefix, current_number)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(*series.org_id.as_uuid())
        .bind(series.module.as_str())
        .bind(series.fiscal_year.start_year())
        .bind(&series.prefix)
        .bind(series.current_number)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn set_current_number(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
        current_number: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE number_series SET current_number = $1
             WHERE org_id = $2 AND module = $3 AND fiscal_year_start = $4",
        )
        .bind(current_number)
        .bind(*org_id.as_uuid())
        .bind(module.as_str())
        .bind(fiscal_year.start_year())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("NumberSeries", module));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingStore for PgTx {
    async fn get_organization(&mut self, org_id: OrgId) -> Result<Organization, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, gstin, state_code, prices_include_gst
             FROM organizations WHERE id = $1",
        )
        .bind(*org_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        let row = row.ok_or_else(|| StoreError::not_found("Organization", org_id))?;
        Ok(Organization {
            id: OrgId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
            name: row.try_get("name").map_err(map_sqlx)?,
            gstin: row.try_get("gstin").map_err(map_sqlx)?,
            state_code: row.try_get("state_code").map_err(map_sqlx)?,
            prices_include_gst: row.try_get("prices_include_gst").map_err(map_sqlx)?,
        })
    }

    async fn get_customer(
        &mut self,
        org_id: OrgId,
        id: CustomerId,
    ) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(
            "SELECT id, org_id, name, gstin, state_code, balance
             FROM customers WHERE org_id = $1 AND id = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.map(|r| {
            Ok(Customer {
                id: CustomerId::from_uuid(r.try_get("id").map_err(map_sqlx)?),
                org_id: OrgId::from_uuid(r.try_get("org_id").map_err(map_sqlx)?),
                name: r.try_get("name").map_err(map_sqlx)?,
                gstin: r.try_get("gstin").map_err(map_sqlx)?,
                state_code: r.try_get("state_code").map_err(map_sqlx)?,
                balance: r.try_get("balance").map_err(map_sqlx)?,
            })
        })
        .transpose()
    }

    async fn adjust_customer_balance(
        &mut self,
        org_id: OrgId,
        id: CustomerId,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE customers SET balance = balance + $1 WHERE org_id = $2 AND id = $3",
        )
        .bind(delta)
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Customer", id));
        }
        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO invoices
                 (id, org_id, customer_id, invoice_number, date, status, lines,
                  subtotal, cgst, sgst, igst, total, balance_due,
                  is_inter_state, prices_include_gst, idempotency_key, journal_entry_id,
                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                     $16, $17, $18, $19)",
        )
        .bind(*invoice.id.as_uuid())
        .bind(*invoice.org_id.as_uuid())
        .bind(*invoice.customer_id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(invoice.date)
        .bind(invoice.status.as_str())
        .bind(lines_json(&invoice.lines)?)
        .bind(invoice.subtotal)
        .bind(invoice.cgst)
        .bind(invoice.sgst)
        .bind(invoice.igst)
        .bind(invoice.total)
        .bind(invoice.balance_due)
        .bind(invoice.is_inter_state)
        .bind(invoice.prices_include_gst)
        .bind(&invoice.idempotency_key)
        .bind(invoice.journal_entry_id.map(|j| *j.as_uuid()))
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_invoice(
        &mut self,
        org_id: OrgId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM invoices WHERE org_id = $1 AND id = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn find_invoice_by_idempotency_key(
        &mut self,
        org_id: OrgId,
        key: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM invoices WHERE org_id = $1 AND idempotency_key = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn update_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE invoices SET
                 customer_id = $3, invoice_number = $4, date = $5, status = $6, lines = $7,
                 subtotal = $8, cgst = $9, sgst = $10, igst = $11, total = $12,
                 balance_due = $13, is_inter_state = $14, prices_include_gst = $15,
                 journal_entry_id = $16, updated_at = $17
             WHERE org_id = $1 AND id = $2",
        )
        .bind(*invoice.org_id.as_uuid())
        .bind(*invoice.id.as_uuid())
        .bind(*invoice.customer_id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(invoice.date)
        .bind(invoice.status.as_str())
        .bind(lines_json(&invoice.lines)?)
        .bind(invoice.subtotal)
        .bind(invoice.cgst)
        .bind(invoice.sgst)
        .bind(invoice.igst)
        .bind(invoice.total)
        .bind(invoice.balance_due)
        .bind(invoice.is_inter_state)
        .bind(invoice.prices_include_gst)
        .bind(invoice.journal_entry_id.map(|j| *j.as_uuid()))
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Invoice", invoice.id));
        }
        Ok(())
    }

    async fn set_invoice_settlement(
        &mut self,
        org_id: OrgId,
        id: InvoiceId,
        balance_due: Decimal,
        status: InvoiceStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE invoices SET balance_due = $1, status = $2, updated_at = now()
             WHERE org_id = $3 AND id = $4",
        )
        .bind(balance_due)
        .bind(status.as_str())
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Invoice", id));
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: Payment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments
                 (id, org_id, customer_id, payment_number, date, amount, method, reference,
                  idempotency_key, journal_entry_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(*payment.id.as_uuid())
        .bind(*payment.org_id.as_uuid())
        .bind(*payment.customer_id.as_uuid())
        .bind(&payment.payment_number)
        .bind(payment.date)
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(&payment.reference)
        .bind(&payment.idempotency_key)
        .bind(payment.journal_entry_id.map(|j| *j.as_uuid()))
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_payment(
        &mut self,
        org_id: OrgId,
        id: PaymentId,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM payments WHERE org_id = $1 AND id = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_payment_by_idempotency_key(
        &mut self,
        org_id: OrgId,
        key: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM payments WHERE org_id = $1 AND idempotency_key = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn insert_credit_note(&mut self, credit_note: CreditNote) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO credit_notes
                 (id, org_id, customer_id, credit_note_number, invoice_id, reason, date, lines,
                  subtotal, cgst, sgst, igst, total, balance, status,
                  idempotency_key, journal_entry_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                     $16, $17, $18)",
        )
        .bind(*credit_note.id.as_uuid())
        .bind(*credit_note.org_id.as_uuid())
        .bind(*credit_note.customer_id.as_uuid())
        .bind(&credit_note.credit_note_number)
        .bind(credit_note.invoice_id.map(|i| *i.as_uuid()))
        .bind(&credit_note.reason)
        .bind(credit_note.date)
        .bind(lines_json(&credit_note.lines)?)
        .bind(credit_note.subtotal)
        .bind(credit_note.cgst)
        .bind(credit_note.sgst)
        .bind(credit_note.igst)
        .bind(credit_note.total)
        .bind(credit_note.balance)
        .bind(credit_note.status.as_str())
        .bind(&credit_note.idempotency_key)
        .bind(credit_note.journal_entry_id.map(|j| *j.as_uuid()))
        .bind(credit_note.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_credit_note(
        &mut self,
        org_id: OrgId,
        id: CreditNoteId,
    ) -> Result<Option<CreditNote>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM credit_notes WHERE org_id = $1 AND id = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(credit_note_from_row).transpose()
    }

    async fn find_credit_note_by_idempotency_key(
        &mut self,
        org_id: OrgId,
        key: &str,
    ) -> Result<Option<CreditNote>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM credit_notes WHERE org_id = $1 AND idempotency_key = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(credit_note_from_row).transpose()
    }

    async fn set_credit_note_application(
        &mut self,
        org_id: OrgId,
        id: CreditNoteId,
        balance: Decimal,
        status: CreditNoteStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE credit_notes SET balance = $1, status = $2
             WHERE org_id = $3 AND id = $4",
        )
        .bind(balance)
        .bind(status.as_str())
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("CreditNote", id));
        }
        Ok(())
    }

    async fn insert_advance(&mut self, advance: Advance) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO advances
                 (id, org_id, customer_id, amount, balance, source_payment_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(*advance.id.as_uuid())
        .bind(*advance.org_id.as_uuid())
        .bind(*advance.customer_id.as_uuid())
        .bind(advance.amount)
        .bind(advance.balance)
        .bind(advance.source_payment_id.map(|p| *p.as_uuid()))
        .bind(advance.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_advance(
        &mut self,
        org_id: OrgId,
        id: AdvanceId,
    ) -> Result<Option<Advance>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM advances WHERE org_id = $1 AND id = $2",
        )
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.map(|r| {
            Ok(Advance {
                id: AdvanceId::from_uuid(r.try_get("id").map_err(map_sqlx)?),
                org_id: OrgId::from_uuid(r.try_get("org_id").map_err(map_sqlx)?),
                customer_id: CustomerId::from_uuid(r.try_get("customer_id").map_err(map_sqlx)?),
                amount: r.try_get("amount").map_err(map_sqlx)?,
                balance: r.try_get("balance").map_err(map_sqlx)?,
                source_payment_id: r
                    .try_get::<Option<Uuid>, _>("source_payment_id")
                    .map_err(map_sqlx)?
                    .map(PaymentId::from_uuid),
                created_at: r.try_get("created_at").map_err(map_sqlx)?,
            })
        })
        .transpose()
    }

    async fn set_advance_balance(
        &mut self,
        org_id: OrgId,
        id: AdvanceId,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE advances SET balance = $1 WHERE org_id = $2 AND id = $3",
        )
        .bind(balance)
        .bind(*org_id.as_uuid())
        .bind(*id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Advance", id));
        }
        Ok(())
    }

    async fn insert_allocation(&mut self, allocation: Allocation) -> Result<(), StoreError> {
        let (source_kind, source_id) = allocation_source_parts(&allocation.source);
        sqlx::query(
            "INSERT INTO allocations
                 (id, org_id, source_kind, source_id, invoice_id, amount, allocated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(*allocation.id.as_uuid())
        .bind(*allocation.org_id.as_uuid())
        .bind(source_kind)
        .bind(source_id)
        .bind(*allocation.invoice_id.as_uuid())
        .bind(allocation.amount)
        .bind(allocation.allocated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_allocations_for_source(
        &mut self,
        org_id: OrgId,
        source: AllocationSource,
    ) -> Result<Vec<Allocation>, StoreError> {
        let (source_kind, source_id) = allocation_source_parts(&source);
        let rows = sqlx::query(
            "SELECT id, org_id, source_kind, source_id, invoice_id, amount, allocated_at
             FROM allocations
             WHERE org_id = $1 AND source_kind = $2 AND source_id = $3
             ORDER BY seq",
        )
        .bind(*org_id.as_uuid())
        .bind(source_kind)
        .bind(source_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(allocation_from_row).collect()
    }
}

// ---- row mapping -----------------------------------------------------

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    Ok(Account {
        id: AccountId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx)?),
        code: row.try_get("code").map_err(map_sqlx)?,
        name: row.try_get("name").map_err(map_sqlx)?,
        account_type: parse_account_type(row.try_get("account_type").map_err(map_sqlx)?)?,
        balance: row.try_get("balance").map_err(map_sqlx)?,
    })
}

fn journal_entry_from_row(row: &PgRow) -> Result<JournalEntry, StoreError> {
    let reference_kind: Option<String> = row.try_get("reference_kind").map_err(map_sqlx)?;
    let reference_id: Option<Uuid> = row.try_get("reference_id").map_err(map_sqlx)?;
    let reference = match (reference_kind, reference_id) {
        (Some(kind), Some(id)) => Some(DocumentRef { kind, id }),
        _ => None,
    };
    Ok(JournalEntry {
        id: JournalEntryId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx)?),
        entry_number: row.try_get("entry_number").map_err(map_sqlx)?,
        date: row.try_get::<NaiveDate, _>("date").map_err(map_sqlx)?,
        narration: row.try_get("narration").map_err(map_sqlx)?,
        reference,
        total_debit: row.try_get("total_debit").map_err(map_sqlx)?,
        total_credit: row.try_get("total_credit").map_err(map_sqlx)?,
        status: parse_entry_status(row.try_get("status").map_err(map_sqlx)?)?,
        created_by: row
            .try_get::<Option<Uuid>, _>("created_by")
            .map_err(map_sqlx)?
            .map(UserId::from_uuid),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(map_sqlx)?,
    })
}

fn party_parts(party: Option<PartyRef>) -> (Option<&'static str>, Option<Uuid>) {
    match party {
        Some(PartyRef::Customer(id)) => (Some("customer"), Some(*id.as_uuid())),
        Some(PartyRef::Vendor(id)) => (Some("vendor"), Some(*id.as_uuid())),
        None => (None, None),
    }
}

fn journal_line_from_row(row: &PgRow) -> Result<JournalLine, StoreError> {
    let party_kind: Option<String> = row.try_get("party_kind").map_err(map_sqlx)?;
    let party_id: Option<Uuid> = row.try_get("party_id").map_err(map_sqlx)?;
    let party = match (party_kind.as_deref(), party_id) {
        (Some("customer"), Some(id)) => Some(PartyRef::Customer(CustomerId::from_uuid(id))),
        (Some("vendor"), Some(id)) => Some(PartyRef::Vendor(VendorId::from_uuid(id))),
        (None, _) => None,
        (Some(other), _) => {
            return Err(StoreError::internal(format!("unknown party kind '{other}'")))
        }
    };
    Ok(JournalLine {
        id: JournalLineId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        journal_entry_id: JournalEntryId::from_uuid(
            row.try_get("journal_entry_id").map_err(map_sqlx)?,
        ),
        account_id: AccountId::from_uuid(row.try_get("account_id").map_err(map_sqlx)?),
        debit: row.try_get("debit").map_err(map_sqlx)?,
        credit: row.try_get("credit").map_err(map_sqlx)?,
        party,
    })
}

fn invoice_from_row(row: &PgRow) -> Result<Invoice, StoreError> {
    Ok(Invoice {
        id: InvoiceId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx)?),
        customer_id: CustomerId::from_uuid(row.try_get("customer_id").map_err(map_sqlx)?),
        invoice_number: row.try_get("invoice_number").map_err(map_sqlx)?,
        date: row.try_get::<NaiveDate, _>("date").map_err(map_sqlx)?,
        status: parse_invoice_status(row.try_get("status").map_err(map_sqlx)?)?,
        lines: lines_from_json(row.try_get("lines").map_err(map_sqlx)?)?,
        subtotal: row.try_get("subtotal").map_err(map_sqlx)?,
        cgst: row.try_get("cgst").map_err(map_sqlx)?,
        sgst: row.try_get("sgst").map_err(map_sqlx)?,
        igst: row.try_get("igst").map_err(map_sqlx)?,
        total: row.try_get("total").map_err(map_sqlx)?,
        balance_due: row.try_get("balance_due").map_err(map_sqlx)?,
        is_inter_state: row.try_get("is_inter_state").map_err(map_sqlx)?,
        prices_include_gst: row.try_get("prices_include_gst").map_err(map_sqlx)?,
        idempotency_key: row.try_get("idempotency_key").map_err(map_sqlx)?,
        journal_entry_id: row
            .try_get::<Option<Uuid>, _>("journal_entry_id")
            .map_err(map_sqlx)?
            .map(JournalEntryId::from_uuid),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(map_sqlx)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(map_sqlx)?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx)?),
        customer_id: CustomerId::from_uuid(row.try_get("customer_id").map_err(map_sqlx)?),
        payment_number: row.try_get("payment_number").map_err(map_sqlx)?,
        date: row.try_get::<NaiveDate, _>("date").map_err(map_sqlx)?,
        amount: row.try_get("amount").map_err(map_sqlx)?,
        method: parse_payment_method(row.try_get("method").map_err(map_sqlx)?)?,
        reference: row.try_get("reference").map_err(map_sqlx)?,
        idempotency_key: row.try_get("idempotency_key").map_err(map_sqlx)?,
        journal_entry_id: row
            .try_get::<Option<Uuid>, _>("journal_entry_id")
            .map_err(map_sqlx)?
            .map(JournalEntryId::from_uuid),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(map_sqlx)?,
    })
}

fn credit_note_from_row(row: &PgRow) -> Result<CreditNote, StoreError> {
    Ok(CreditNote {
        id: CreditNoteId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx)?),
        customer_id: CustomerId::from_uuid(row.try_get("customer_id").map_err(map_sqlx)?),
        credit_note_number: row.try_get("credit_note_number").map_err(map_sqlx)?,
        invoice_id: row
            .try_get::<Option<Uuid>, _>("invoice_id")
            .map_err(map_sqlx)?
            .map(InvoiceId::from_uuid),
        reason: row.try_get("reason").map_err(map_sqlx)?,
        date: row.try_get::<NaiveDate, _>("date").map_err(map_sqlx)?,
        lines: lines_from_json(row.try_get("lines").map_err(map_sqlx)?)?,
        subtotal: row.try_get("subtotal").map_err(map_sqlx)?,
        cgst: row.try_get("cgst").map_err(map_sqlx)?,
        sgst: row.try_get("sgst").map_err(map_sqlx)?,
        igst: row.try_get("igst").map_err(map_sqlx)?,
        total: row.try_get("total").map_err(map_sqlx)?,
        balance: row.try_get("balance").map_err(map_sqlx)?,
        status: parse_credit_note_status(row.try_get("status").map_err(map_sqlx)?)?,
        idempotency_key: row.try_get("idempotency_key").map_err(map_sqlx)?,
        journal_entry_id: row
            .try_get::<Option<Uuid>, _>("journal_entry_id")
            .map_err(map_sqlx)?
            .map(JournalEntryId::from_uuid),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(map_sqlx)?,
    })
}

fn allocation_from_row(row: &PgRow) -> Result<Allocation, StoreError> {
    let source_kind: String = row.try_get("source_kind").map_err(map_sqlx)?;
    let source_id: Uuid = row.try_get("source_id").map_err(map_sqlx)?;
    Ok(Allocation {
        id: core_kernel::AllocationId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx)?),
        source: allocation_source_from(&source_kind, source_id)?,
        invoice_id: InvoiceId::from_uuid(row.try_get("invoice_id").map_err(map_sqlx)?),
        amount: row.try_get("amount").map_err(map_sqlx)?,
        allocated_at: row.try_get::<DateTime<Utc>, _>("allocated_at").map_err(map_sqlx)?,
    })
}

fn lines_json(lines: &[InvoiceLine]) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(lines).map_err(|e| StoreError::internal(e.to_string()))
}

fn lines_from_json(value: serde_json::Value) -> Result<Vec<InvoiceLine>, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::internal(e.to_string()))
}

fn allocation_source_parts(source: &AllocationSource) -> (&'static str, Uuid) {
    match source {
        AllocationSource::Payment(id) => ("payment", *id.as_uuid()),
        AllocationSource::CreditNote(id) => ("credit_note", *id.as_uuid()),
        AllocationSource::Advance(id) => ("advance", *id.as_uuid()),
    }
}

fn allocation_source_from(kind: &str, id: Uuid) -> Result<AllocationSource, StoreError> {
    match kind {
        "payment" => Ok(AllocationSource::Payment(PaymentId::from_uuid(id))),
        "credit_note" => Ok(AllocationSource::CreditNote(CreditNoteId::from_uuid(id))),
        "advance" => Ok(AllocationSource::Advance(AdvanceId::from_uuid(id))),
        other => Err(StoreError::internal(format!("unknown allocation source '{other}'"))),
    }
}

fn parse_account_type(s: &str) -> Result<AccountType, StoreError> {
    match s {
        "asset" => Ok(AccountType::Asset),
        "liability" => Ok(AccountType::Liability),
        "equity" => Ok(AccountType::Equity),
        "income" => Ok(AccountType::Income),
        "expense" => Ok(AccountType::Expense),
        other => Err(StoreError::internal(format!("unknown account type '{other}'"))),
    }
}

fn parse_entry_status(s: &str) -> Result<EntryStatus, StoreError> {
    match s {
        "posted" => Ok(EntryStatus::Posted),
        "reversed" => Ok(EntryStatus::Reversed),
        other => Err(StoreError::internal(format!("unknown entry status '{other}'"))),
    }
}

fn parse_invoice_status(s: &str) -> Result<InvoiceStatus, StoreError> {
    match s {
        "draft" => Ok(InvoiceStatus::Draft),
        "issued" => Ok(InvoiceStatus::Issued),
        "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
        "paid" => Ok(InvoiceStatus::Paid),
        "cancelled" => Ok(InvoiceStatus::Cancelled),
        other => Err(StoreError::internal(format!("unknown invoice status '{other}'"))),
    }
}

fn parse_credit_note_status(s: &str) -> Result<CreditNoteStatus, StoreError> {
    match s {
        "issued" => Ok(CreditNoteStatus::Issued),
        "partially_applied" => Ok(CreditNoteStatus::PartiallyApplied),
        "applied" => Ok(CreditNoteStatus::Applied),
        "cancelled" => Ok(CreditNoteStatus::Cancelled),
        other => Err(StoreError::internal(format!("unknown credit note status '{other}'"))),
    }
}

fn parse_payment_method(s: &str) -> Result<PaymentMethod, StoreError> {
    match s {
        "cash" => Ok(PaymentMethod::Cash),
        "bank_transfer" => Ok(PaymentMethod::BankTransfer),
        "upi" => Ok(PaymentMethod::Upi),
        "card" => Ok(PaymentMethod::Card),
        "cheque" => Ok(PaymentMethod::Cheque),
        other => Err(StoreError::internal(format!("unknown payment method '{other}'"))),
    }
}
