//! Settlement and allocation workflows
//!
//! Each function is one user-facing operation and runs end-to-end
//! inside the caller's transaction: tax totals, document numbering,
//! idempotency, the journal posting, and every denormalized balance
//! either all commit or all roll back.
//!
//! Errors propagate typed; the one exception is a conflict from an
//! idempotency unique constraint, which is caught, re-queried, and
//! returned as the winning document's identity.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::instrument;

use core_kernel::{
    money, AdvanceId, AllocationId, CreditNoteId, CustomerId, DomainEvent, FiscalYear, InvoiceId,
    JournalEntryId, OrgId, PaymentId, StoreError, UserId, WorkflowEnv,
};
use domain_ledger::{codes, post, reverse, DocumentRef, PartyRef, PostingInput, PostingLine};
use domain_numbering::{bump_if_higher, next_number, DocModule};
use domain_tax::{
    calculate_invoice_tax_totals, calculate_line_tax, resolve_prices_include_gst,
    InvoiceTaxTotals, TaxContext, TaxLine,
};

use crate::advance::Advance;
use crate::allocation::{Allocation, AllocationSource, CreditSource, CreditSourceRequest};
use crate::credit_note::{CreditNote, CreditNoteStatus};
use crate::customer::is_inter_state;
use crate::error::BillingError;
use crate::idempotency::{check_idempotency, DocKind};
use crate::invoice::{Invoice, InvoiceLine, InvoiceStatus};
use crate::payment::{Payment, PaymentMethod};
use crate::store::{
    SettlementTx, CREDIT_NOTE_IDEMPOTENCY_CONSTRAINT, INVOICE_IDEMPOTENCY_CONSTRAINT,
    PAYMENT_IDEMPOTENCY_CONSTRAINT,
};

/// One line as entered by the caller, before tax computation.
#[derive(Debug, Clone)]
pub struct InvoiceLineInput {
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub gst_rate: Decimal,
}

#[derive(Debug, Clone)]
pub struct CreateInvoiceInput {
    pub customer_id: CustomerId,
    /// Defaults to today in IST
    pub date: Option<NaiveDate>,
    pub lines: Vec<InvoiceLineInput>,
    /// Document-level override of the org's pricing default
    pub prices_include_gst: Option<bool>,
    /// Caller-supplied number; the series counter is bumped to match
    pub manual_number: Option<String>,
    /// Issue immediately, or leave as an unnumbered draft
    pub issue: bool,
    pub idempotency_key: Option<String>,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct InvoiceOutcome {
    pub invoice_id: InvoiceId,
    pub invoice_number: Option<String>,
    pub status: InvoiceStatus,
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total: Decimal,
    pub balance_due: Decimal,
    pub is_inter_state: bool,
    pub prices_include_gst: bool,
    pub journal_entry_id: Option<JournalEntryId>,
}

impl InvoiceOutcome {
    fn from_invoice(invoice: &Invoice) -> Self {
        Self {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            status: invoice.status,
            subtotal: invoice.subtotal,
            cgst: invoice.cgst,
            sgst: invoice.sgst,
            igst: invoice.igst,
            total: invoice.total,
            balance_due: invoice.balance_due,
            is_inter_state: invoice.is_inter_state,
            prices_include_gst: invoice.prices_include_gst,
            journal_entry_id: invoice.journal_entry_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordInvoicePaymentInput {
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub date: Option<NaiveDate>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment_id: PaymentId,
    pub payment_number: String,
    pub amount: Decimal,
    /// Portion allocated against the invoice
    pub applied: Decimal,
    /// Excess banked as a customer advance
    pub advance_amount: Decimal,
    pub advance_id: Option<AdvanceId>,
    pub invoice_status: InvoiceStatus,
}

/// One applied credit, reported back to the caller.
#[derive(Debug, Clone, Copy)]
pub struct AppliedCredit {
    pub source: CreditSource,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct CreditApplication {
    pub applied_total: Decimal,
    pub applied: Vec<AppliedCredit>,
    pub invoice_status: InvoiceStatus,
    pub balance_due: Decimal,
}

#[derive(Debug, Clone)]
pub struct SettleInvoiceInput {
    pub invoice_id: InvoiceId,
    /// Applied first, in the given order
    pub credits: Vec<CreditSourceRequest>,
    /// Cash applied after credits; excess becomes an advance
    pub payment_amount: Option<Decimal>,
    pub date: Option<NaiveDate>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub credits: CreditApplication,
    pub payment: Option<PaymentOutcome>,
    pub invoice_status: InvoiceStatus,
}

#[derive(Debug, Clone)]
pub struct PaymentAllocationRequest {
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct CreateCustomerPaymentInput {
    pub customer_id: CustomerId,
    pub amount: Decimal,
    pub date: Option<NaiveDate>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// Distributed in order; each capped by that invoice's balance due
    pub allocations: Vec<PaymentAllocationRequest>,
    pub idempotency_key: Option<String>,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct CustomerPaymentOutcome {
    pub payment_id: PaymentId,
    pub payment_number: String,
    pub amount: Decimal,
    pub allocated_total: Decimal,
    pub allocations: Vec<(InvoiceId, Decimal)>,
    pub advance_amount: Decimal,
    pub advance_id: Option<AdvanceId>,
}

#[derive(Debug, Clone)]
pub struct CreateCreditNoteInput {
    pub customer_id: CustomerId,
    pub invoice_id: Option<InvoiceId>,
    pub reason: Option<String>,
    pub date: Option<NaiveDate>,
    pub lines: Vec<InvoiceLineInput>,
    pub prices_include_gst: Option<bool>,
    pub idempotency_key: Option<String>,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct CreditNoteOutcome {
    pub credit_note_id: CreditNoteId,
    pub credit_note_number: String,
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total: Decimal,
    pub balance: Decimal,
    pub status: CreditNoteStatus,
    pub journal_entry_id: Option<JournalEntryId>,
}

impl CreditNoteOutcome {
    fn from_credit_note(cn: &CreditNote) -> Self {
        Self {
            credit_note_id: cn.id,
            credit_note_number: cn.credit_note_number.clone(),
            subtotal: cn.subtotal,
            cgst: cn.cgst,
            sgst: cn.sgst,
            igst: cn.igst,
            total: cn.total,
            balance: cn.balance,
            status: cn.status,
            journal_entry_id: cn.journal_entry_id,
        }
    }
}

/// Creates an invoice, optionally issuing it in the same transaction.
///
/// Issuing computes the GST totals, numbers the document, posts
/// Dr Accounts Receivable / Cr Sales + Cr output GST, and increases the
/// customer's running balance. Drafts only persist the computed totals.
#[instrument(skip(tx, env, input), fields(org_id = %org_id, customer_id = %input.customer_id))]
pub async fn create_invoice_in_tx<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    input: CreateInvoiceInput,
) -> Result<InvoiceOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    if let Some(existing) =
        check_idempotency(tx, DocKind::Invoice, org_id, input.idempotency_key.as_deref()).await?
    {
        let invoice = tx
            .get_invoice(org_id, InvoiceId::from_uuid(existing.id))
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(InvoiceId::from_uuid(existing.id)))?;
        return Ok(InvoiceOutcome::from_invoice(&invoice));
    }

    let org = tx.get_organization(org_id).await?;
    let customer = tx
        .get_customer(org_id, input.customer_id)
        .await?
        .ok_or(BillingError::CustomerNotFound(input.customer_id))?;
    if input.lines.is_empty() {
        return Err(BillingError::EmptyLines);
    }

    let inter_state = is_inter_state(&org, &customer);
    let inclusive =
        resolve_prices_include_gst(input.prices_include_gst, Some(org.prices_include_gst));
    let ctx = TaxContext { is_inter_state: inter_state, prices_include_gst: inclusive };
    let (lines, totals) = compute_lines(env, &input.lines, &ctx)?;

    let date = input.date.unwrap_or_else(|| env.clock.today_ist());
    let number = match &input.manual_number {
        Some(manual) => {
            bump_if_higher(tx, org_id, DocModule::Invoice, manual).await?;
            Some(manual.clone())
        }
        None if input.issue => Some(
            next_number(
                tx,
                env.clock,
                org_id,
                DocModule::Invoice,
                Some(FiscalYear::from_date(date)),
            )
            .await?,
        ),
        None => None,
    };

    let now = env.clock.now();
    let mut invoice = Invoice {
        id: InvoiceId::from_uuid(env.ids.next()),
        org_id,
        customer_id: customer.id,
        invoice_number: number,
        date,
        status: if input.issue { InvoiceStatus::Issued } else { InvoiceStatus::Draft },
        lines,
        subtotal: totals.subtotal,
        cgst: totals.cgst,
        sgst: totals.sgst,
        igst: totals.igst,
        total: totals.total,
        balance_due: totals.total,
        is_inter_state: inter_state,
        prices_include_gst: inclusive,
        idempotency_key: input.idempotency_key.clone(),
        journal_entry_id: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = tx.insert_invoice(invoice.clone()).await {
        if err.violates(INVOICE_IDEMPOTENCY_CONSTRAINT) {
            if let Some(key) = input.idempotency_key.as_deref() {
                // Lost the idempotency race; return the winner.
                if let Some(winner) = tx.find_invoice_by_idempotency_key(org_id, key).await? {
                    return Ok(InvoiceOutcome::from_invoice(&winner));
                }
            }
        }
        return Err(err.into());
    }

    if input.issue {
        let entry_id = post_invoice_entry(tx, env, org_id, &invoice, input.created_by).await?;
        invoice.journal_entry_id = Some(entry_id);
        tx.update_invoice(invoice.clone()).await?;
        tx.adjust_customer_balance(org_id, customer.id, invoice.total).await?;

        env.events.record(
            DomainEvent::new(org_id, "invoice.issued", "invoice", invoice.id).with_detail(
                serde_json::json!({
                    "invoice_number": invoice.invoice_number,
                    "total": invoice.total,
                }),
            ),
        );
    }

    Ok(InvoiceOutcome::from_invoice(&invoice))
}

/// Numbers (if needed) and posts a draft invoice.
#[instrument(skip(tx, env), fields(org_id = %org_id, invoice_id = %invoice_id))]
pub async fn issue_draft_invoice_in_tx<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    invoice_id: InvoiceId,
    date: Option<NaiveDate>,
    issued_by: Option<UserId>,
) -> Result<InvoiceOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let mut invoice = tx
        .get_invoice(org_id, invoice_id)
        .await?
        .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
    if invoice.status != InvoiceStatus::Draft {
        return Err(BillingError::InvoiceNotDraft { status: invoice.status });
    }

    if let Some(date) = date {
        invoice.date = date;
    }
    if invoice.invoice_number.is_none() {
        invoice.invoice_number = Some(
            next_number(
                tx,
                env.clock,
                org_id,
                DocModule::Invoice,
                Some(FiscalYear::from_date(invoice.date)),
            )
            .await?,
        );
    }

    invoice.status = InvoiceStatus::Issued;
    invoice.balance_due = invoice.total;
    let entry_id = post_invoice_entry(tx, env, org_id, &invoice, issued_by).await?;
    invoice.journal_entry_id = Some(entry_id);
    invoice.updated_at = env.clock.now();
    tx.update_invoice(invoice.clone()).await?;
    tx.adjust_customer_balance(org_id, invoice.customer_id, invoice.total).await?;

    env.events.record(
        DomainEvent::new(org_id, "invoice.issued", "invoice", invoice.id).with_detail(
            serde_json::json!({
                "invoice_number": invoice.invoice_number,
                "total": invoice.total,
            }),
        ),
    );

    Ok(InvoiceOutcome::from_invoice(&invoice))
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDraftInvoiceInput {
    pub customer_id: Option<CustomerId>,
    pub date: Option<NaiveDate>,
    pub lines: Option<Vec<InvoiceLineInput>>,
    pub prices_include_gst: Option<bool>,
}

/// Replaces a draft's lines/customer/date and recomputes its totals.
#[instrument(skip(tx, env, input), fields(org_id = %org_id, invoice_id = %invoice_id))]
pub async fn update_draft_invoice_in_tx<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    invoice_id: InvoiceId,
    input: UpdateDraftInvoiceInput,
) -> Result<InvoiceOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let mut invoice = tx
        .get_invoice(org_id, invoice_id)
        .await?
        .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
    if invoice.status != InvoiceStatus::Draft {
        return Err(BillingError::InvoiceNotDraft { status: invoice.status });
    }

    let org = tx.get_organization(org_id).await?;
    let customer_id = input.customer_id.unwrap_or(invoice.customer_id);
    let customer = tx
        .get_customer(org_id, customer_id)
        .await?
        .ok_or(BillingError::CustomerNotFound(customer_id))?;

    // Missing lines mean "keep the existing ones"; totals are still
    // recomputed because the customer or pricing mode may have changed.
    let line_inputs: Vec<InvoiceLineInput> = match input.lines {
        Some(lines) => lines,
        None => invoice
            .lines
            .iter()
            .map(|l| InvoiceLineInput {
                description: l.description.clone(),
                quantity: l.quantity,
                rate: l.rate,
                gst_rate: l.gst_rate,
            })
            .collect(),
    };
    if line_inputs.is_empty() {
        return Err(BillingError::EmptyLines);
    }

    let inter_state = is_inter_state(&org, &customer);
    let inclusive = resolve_prices_include_gst(
        input.prices_include_gst.or(Some(invoice.prices_include_gst)),
        Some(org.prices_include_gst),
    );
    let ctx = TaxContext { is_inter_state: inter_state, prices_include_gst: inclusive };
    let (lines, totals) = compute_lines(env, &line_inputs, &ctx)?;

    invoice.customer_id = customer.id;
    if let Some(date) = input.date {
        invoice.date = date;
    }
    invoice.lines = lines;
    invoice.subtotal = totals.subtotal;
    invoice.cgst = totals.cgst;
    invoice.sgst = totals.sgst;
    invoice.igst = totals.igst;
    invoice.total = totals.total;
    invoice.balance_due = totals.total;
    invoice.is_inter_state = inter_state;
    invoice.prices_include_gst = inclusive;
    invoice.updated_at = env.clock.now();
    tx.update_invoice(invoice.clone()).await?;

    Ok(InvoiceOutcome::from_invoice(&invoice))
}

/// Cancels an invoice.
///
/// Drafts are marked cancelled directly; issued invoices get their
/// journal entry reversed and the customer balance wound back. Paid and
/// partially paid invoices are rejected, settlements must be unwound
/// first.
#[instrument(skip(tx, env), fields(org_id = %org_id, invoice_id = %invoice_id))]
pub async fn cancel_invoice_in_tx<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    invoice_id: InvoiceId,
    cancelled_by: Option<UserId>,
) -> Result<InvoiceOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let mut invoice = tx
        .get_invoice(org_id, invoice_id)
        .await?
        .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

    match invoice.status {
        InvoiceStatus::Draft => {}
        InvoiceStatus::Issued => {
            let entry_id = invoice
                .journal_entry_id
                .ok_or(BillingError::MissingJournalEntry(invoice_id))?;
            reverse(tx, env, org_id, entry_id, env.clock.today_ist(), cancelled_by).await?;
            tx.adjust_customer_balance(org_id, invoice.customer_id, -invoice.total).await?;
        }
        status => return Err(BillingError::CannotCancel { status }),
    }

    invoice.status = InvoiceStatus::Cancelled;
    invoice.balance_due = Decimal::ZERO;
    invoice.updated_at = env.clock.now();
    tx.update_invoice(invoice.clone()).await?;

    env.events.record(
        DomainEvent::new(org_id, "invoice.cancelled", "invoice", invoice.id)
            .with_detail(serde_json::json!({ "invoice_number": invoice.invoice_number })),
    );

    Ok(InvoiceOutcome::from_invoice(&invoice))
}

/// Records a cash payment against one open invoice.
///
/// The applied portion is `min(amount, balance due)`; any excess is
/// banked as a customer advance rather than rejected.
#[instrument(skip(tx, env, input), fields(org_id = %org_id, invoice_id = %input.invoice_id))]
pub async fn record_invoice_payment_in_tx<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    input: RecordInvoicePaymentInput,
) -> Result<PaymentOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let amount = money::round2(input.amount);
    if amount <= Decimal::ZERO {
        return Err(BillingError::AmountNotPositive { field: "amount", value: input.amount });
    }

    if let Some(existing) =
        check_idempotency(tx, DocKind::Payment, org_id, input.idempotency_key.as_deref()).await?
    {
        return replay_payment_outcome(
            tx,
            org_id,
            PaymentId::from_uuid(existing.id),
            input.invoice_id,
        )
        .await;
    }

    let invoice = tx
        .get_invoice(org_id, input.invoice_id)
        .await?
        .ok_or(BillingError::InvoiceNotFound(input.invoice_id))?;
    if !invoice.status.is_open() {
        return Err(BillingError::InvoiceNotOpen { status: invoice.status });
    }

    let date = input.date.unwrap_or_else(|| env.clock.today_ist());
    apply_cash_to_invoice(
        tx,
        env,
        org_id,
        invoice,
        amount,
        date,
        input.method,
        input.reference,
        input.idempotency_key,
        input.created_by,
    )
    .await
}

/// Applies credit notes and advances to an open invoice, caller order.
///
/// Explicitly requested amounts are validated in aggregate against the
/// balance due before anything is persisted; open-ended requests
/// (`amount: None`) are capped at the remaining due. Credit-note
/// application moves only document balances (its issuance already moved
/// AR); advance application posts Dr Customer Advances / Cr AR.
#[instrument(skip(tx, env, sources), fields(org_id = %org_id, invoice_id = %invoice_id, sources = sources.len()))]
pub async fn apply_credits_to_invoice_in_tx<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    invoice_id: InvoiceId,
    sources: Vec<CreditSourceRequest>,
) -> Result<CreditApplication, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let invoice = tx
        .get_invoice(org_id, invoice_id)
        .await?
        .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
    if !invoice.status.is_open() {
        return Err(BillingError::InvoiceNotOpen { status: invoice.status });
    }

    // Validation pass: resolve each source once and draw requests
    // against its running balance, so a source repeated in one request
    // cannot be overdrawn. Rejects before any write happens.
    let mut source_balances: Vec<(CreditSource, Decimal)> = Vec::new();
    let mut resolved: Vec<(CreditSource, Decimal)> = Vec::with_capacity(sources.len());
    let mut explicit_total = Decimal::ZERO;
    for request in &sources {
        let available = match source_balances.iter().find(|(s, _)| *s == request.source) {
            Some((_, balance)) => *balance,
            None => {
                let balance = match request.source {
                    CreditSource::CreditNote(id) => {
                        let cn = tx
                            .get_credit_note(org_id, id)
                            .await?
                            .ok_or(BillingError::CreditNoteNotFound(id))?;
                        cn.balance
                    }
                    CreditSource::Advance(id) => {
                        let advance = tx
                            .get_advance(org_id, id)
                            .await?
                            .ok_or(BillingError::AdvanceNotFound(id))?;
                        advance.balance
                    }
                };
                source_balances.push((request.source, balance));
                balance
            }
        };
        let requested = match request.amount {
            Some(amount) => {
                let amount = money::round2(amount);
                if amount <= Decimal::ZERO {
                    return Err(BillingError::AmountNotPositive {
                        field: "allocation amount",
                        value: amount,
                    });
                }
                if money::exceeds(amount, available) {
                    return Err(BillingError::SourceInsufficient {
                        requested: amount,
                        available,
                    });
                }
                explicit_total = money::add(&[explicit_total, amount]);
                amount
            }
            None => available,
        };
        if let Some(entry) = source_balances.iter_mut().find(|(s, _)| *s == request.source) {
            entry.1 = money::subtract(entry.1, requested);
        }
        resolved.push((request.source, requested));
    }
    if money::exceeds(explicit_total, invoice.balance_due) {
        return Err(BillingError::OverAllocation {
            requested: explicit_total,
            balance_due: invoice.balance_due,
        });
    }

    let mut remaining = invoice.balance_due;
    let mut applied = Vec::new();
    let mut applied_total = Decimal::ZERO;
    for (source, requested) in resolved {
        // requested is already bounded by the source's running balance;
        // the apply step subtracts at most that from the fresh row.
        let take = money::round2(requested.min(remaining));
        if money::is_effectively_zero(take) {
            continue;
        }
        match source {
            CreditSource::CreditNote(id) => {
                // No journal entry: the note's issuance already moved AR.
                let mut cn = tx
                    .get_credit_note(org_id, id)
                    .await?
                    .ok_or(BillingError::CreditNoteNotFound(id))?;
                cn.balance = money::subtract(cn.balance, take);
                let status = cn.applied_status();
                tx.set_credit_note_application(org_id, id, cn.balance, status).await?;
                record_allocation(tx, env, org_id, AllocationSource::CreditNote(id), invoice_id, take)
                    .await?;
            }
            CreditSource::Advance(id) => {
                let advance = tx
                    .get_advance(org_id, id)
                    .await?
                    .ok_or(BillingError::AdvanceNotFound(id))?;
                post_advance_application(tx, env, org_id, &invoice, &advance, take).await?;
                tx.set_advance_balance(org_id, id, money::subtract(advance.balance, take)).await?;
                tx.adjust_customer_balance(org_id, invoice.customer_id, -take).await?;
                record_allocation(tx, env, org_id, AllocationSource::Advance(id), invoice_id, take)
                    .await?;
            }
        }
        remaining = money::subtract(remaining, take);
        applied_total = money::add(&[applied_total, take]);
        applied.push(AppliedCredit { source, amount: take });
    }

    // Nothing applied: the invoice is untouched, keep its status.
    let status = if applied.is_empty() {
        invoice.status
    } else {
        let status = settle_status(remaining);
        tx.set_invoice_settlement(org_id, invoice_id, remaining, status).await?;
        if status == InvoiceStatus::Paid {
            env.events.record(
                DomainEvent::new(org_id, "invoice.settled", "invoice", invoice_id)
                    .with_detail(serde_json::json!({ "invoice_number": invoice.invoice_number })),
            );
        }
        status
    };

    Ok(CreditApplication { applied_total, applied, invoice_status: status, balance_due: remaining })
}

/// Settles an invoice from credits and cash in one transaction.
///
/// Credits go first in caller order, then the cash payment; cash beyond
/// the remaining due is banked as an advance.
#[instrument(skip(tx, env, input), fields(org_id = %org_id, invoice_id = %input.invoice_id))]
pub async fn settle_invoice_in_tx<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    input: SettleInvoiceInput,
) -> Result<SettlementOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let credits = if input.credits.is_empty() {
        let invoice = tx
            .get_invoice(org_id, input.invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(input.invoice_id))?;
        if !invoice.status.is_open() {
            return Err(BillingError::InvoiceNotOpen { status: invoice.status });
        }
        CreditApplication {
            applied_total: Decimal::ZERO,
            applied: Vec::new(),
            invoice_status: invoice.status,
            balance_due: invoice.balance_due,
        }
    } else {
        apply_credits_to_invoice_in_tx(tx, env, org_id, input.invoice_id, input.credits).await?
    };

    let mut invoice_status = credits.invoice_status;
    let payment = match input.payment_amount {
        Some(amount) if money::round2(amount) > Decimal::ZERO => {
            let amount = money::round2(amount);
            let date = input.date.unwrap_or_else(|| env.clock.today_ist());
            let invoice = tx
                .get_invoice(org_id, input.invoice_id)
                .await?
                .ok_or(BillingError::InvoiceNotFound(input.invoice_id))?;
            let outcome = apply_cash_to_invoice(
                tx,
                env,
                org_id,
                invoice,
                amount,
                date,
                input.method,
                input.reference,
                input.idempotency_key,
                input.created_by,
            )
            .await?;
            invoice_status = outcome.invoice_status;
            Some(outcome)
        }
        Some(amount) => {
            return Err(BillingError::AmountNotPositive { field: "payment_amount", value: amount })
        }
        None => None,
    };

    Ok(SettlementOutcome { credits, payment, invoice_status })
}

/// Records a payment not tied to a single invoice up front.
///
/// The named allocations are distributed in order, each capped by that
/// invoice's balance due; the unallocated remainder is banked as an
/// advance.
#[instrument(skip(tx, env, input), fields(org_id = %org_id, customer_id = %input.customer_id))]
pub async fn create_customer_payment_in_tx<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    input: CreateCustomerPaymentInput,
) -> Result<CustomerPaymentOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let amount = money::round2(input.amount);
    if amount <= Decimal::ZERO {
        return Err(BillingError::AmountNotPositive { field: "amount", value: input.amount });
    }
    let requested_total =
        money::add(&input.allocations.iter().map(|a| money::round2(a.amount)).collect::<Vec<_>>());
    if money::exceeds(requested_total, amount) {
        return Err(BillingError::AllocationExceedsPayment { requested: requested_total, amount });
    }

    if let Some(existing) =
        check_idempotency(tx, DocKind::Payment, org_id, input.idempotency_key.as_deref()).await?
    {
        return replay_customer_payment_outcome(tx, org_id, PaymentId::from_uuid(existing.id))
            .await;
    }

    let customer = tx
        .get_customer(org_id, input.customer_id)
        .await?
        .ok_or(BillingError::CustomerNotFound(input.customer_id))?;

    // Resolve target invoices before writing anything.
    let mut targets: Vec<(Invoice, Decimal)> = Vec::with_capacity(input.allocations.len());
    for request in &input.allocations {
        let invoice = tx
            .get_invoice(org_id, request.invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(request.invoice_id))?;
        if !invoice.status.is_open() {
            return Err(BillingError::InvoiceNotOpen { status: invoice.status });
        }
        targets.push((invoice, money::round2(request.amount)));
    }

    let mut planned: Vec<(InvoiceId, Decimal, Decimal)> = Vec::new();
    let mut allocated_total = Decimal::ZERO;
    for (invoice, requested) in &targets {
        // An invoice named twice draws from its running due, not the
        // pre-write snapshot.
        let due = planned
            .iter()
            .rev()
            .find(|(id, _, _)| *id == invoice.id)
            .map(|(_, _, new_due)| *new_due)
            .unwrap_or(invoice.balance_due);
        let take = money::round2((*requested).min(due));
        if money::is_effectively_zero(take) {
            continue;
        }
        let new_due = money::subtract(due, take);
        planned.push((invoice.id, take, new_due));
        allocated_total = money::add(&[allocated_total, take]);
    }
    let remainder = money::subtract(amount, allocated_total);

    let date = input.date.unwrap_or_else(|| env.clock.today_ist());
    let number = next_number(
        tx,
        env.clock,
        org_id,
        DocModule::Payment,
        Some(FiscalYear::from_date(date)),
    )
    .await?;

    let mut posting_lines = vec![PostingLine::debit(codes::CASH, amount)];
    if allocated_total > Decimal::ZERO {
        posting_lines.push(
            PostingLine::credit(codes::ACCOUNTS_RECEIVABLE, allocated_total)
                .for_party(PartyRef::Customer(customer.id)),
        );
    }
    if !money::is_effectively_zero(remainder) {
        posting_lines.push(PostingLine::credit(codes::CUSTOMER_ADVANCES, remainder));
    }

    let payment_id = PaymentId::from_uuid(env.ids.next());
    let posted = post(
        tx,
        env,
        org_id,
        PostingInput {
            date,
            narration: format!("Payment {number} received"),
            reference: Some(DocumentRef::new("payment", *payment_id.as_uuid())),
            lines: posting_lines,
            created_by: input.created_by,
        },
    )
    .await?;

    let payment = Payment {
        id: payment_id,
        org_id,
        customer_id: customer.id,
        payment_number: number.clone(),
        date,
        amount,
        method: input.method,
        reference: input.reference,
        idempotency_key: input.idempotency_key.clone(),
        journal_entry_id: Some(posted.journal_entry_id),
        created_at: env.clock.now(),
    };
    if let Err(err) = tx.insert_payment(payment).await {
        if err.violates(PAYMENT_IDEMPOTENCY_CONSTRAINT) {
            if let Some(key) = input.idempotency_key.as_deref() {
                if let Some(winner) = tx.find_payment_by_idempotency_key(org_id, key).await? {
                    return replay_customer_payment_outcome(tx, org_id, winner.id).await;
                }
            }
        }
        return Err(err.into());
    }

    let mut allocations = Vec::with_capacity(planned.len());
    for (invoice_id, take, new_due) in planned {
        record_allocation(tx, env, org_id, AllocationSource::Payment(payment_id), invoice_id, take)
            .await?;
        tx.set_invoice_settlement(org_id, invoice_id, new_due, settle_status(new_due)).await?;
        allocations.push((invoice_id, take));
    }
    if allocated_total > Decimal::ZERO {
        tx.adjust_customer_balance(org_id, customer.id, -allocated_total).await?;
    }

    let advance_id = if money::is_effectively_zero(remainder) {
        None
    } else {
        Some(bank_advance(tx, env, org_id, customer.id, remainder, Some(payment_id)).await?)
    };

    env.events.record(
        DomainEvent::new(org_id, "payment.recorded", "payment", payment_id).with_detail(
            serde_json::json!({
                "payment_number": number,
                "amount": amount,
                "allocated": allocated_total,
                "advance": remainder,
            }),
        ),
    );

    Ok(CustomerPaymentOutcome {
        payment_id,
        payment_number: number,
        amount,
        allocated_total,
        allocations,
        advance_amount: remainder,
        advance_id,
    })
}

/// Issues a credit note: the reversing-style journal entry posts
/// immediately, and the full amount becomes available for application.
#[instrument(skip(tx, env, input), fields(org_id = %org_id, customer_id = %input.customer_id))]
pub async fn create_credit_note_in_tx<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    input: CreateCreditNoteInput,
) -> Result<CreditNoteOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    if let Some(existing) =
        check_idempotency(tx, DocKind::CreditNote, org_id, input.idempotency_key.as_deref())
            .await?
    {
        let id = CreditNoteId::from_uuid(existing.id);
        let cn = tx
            .get_credit_note(org_id, id)
            .await?
            .ok_or(BillingError::CreditNoteNotFound(id))?;
        return Ok(CreditNoteOutcome::from_credit_note(&cn));
    }

    let org = tx.get_organization(org_id).await?;
    let customer = tx
        .get_customer(org_id, input.customer_id)
        .await?
        .ok_or(BillingError::CustomerNotFound(input.customer_id))?;
    if input.lines.is_empty() {
        return Err(BillingError::EmptyLines);
    }

    let inter_state = is_inter_state(&org, &customer);
    let inclusive =
        resolve_prices_include_gst(input.prices_include_gst, Some(org.prices_include_gst));
    let ctx = TaxContext { is_inter_state: inter_state, prices_include_gst: inclusive };
    let (lines, totals) = compute_lines(env, &input.lines, &ctx)?;

    let date = input.date.unwrap_or_else(|| env.clock.today_ist());
    let number = next_number(
        tx,
        env.clock,
        org_id,
        DocModule::CreditNote,
        Some(FiscalYear::from_date(date)),
    )
    .await?;

    let credit_note_id = CreditNoteId::from_uuid(env.ids.next());
    let mut posting_lines = vec![PostingLine::debit(codes::SALES, totals.subtotal)];
    push_gst_legs(&mut posting_lines, &totals, true);
    posting_lines.push(
        PostingLine::credit(codes::ACCOUNTS_RECEIVABLE, totals.total)
            .for_party(PartyRef::Customer(customer.id)),
    );

    let posted = post(
        tx,
        env,
        org_id,
        PostingInput {
            date,
            narration: format!("Credit note {number}"),
            reference: Some(DocumentRef::new("credit_note", *credit_note_id.as_uuid())),
            lines: posting_lines,
            created_by: input.created_by,
        },
    )
    .await?;

    let credit_note = CreditNote {
        id: credit_note_id,
        org_id,
        customer_id: customer.id,
        credit_note_number: number.clone(),
        invoice_id: input.invoice_id,
        reason: input.reason,
        date,
        lines,
        subtotal: totals.subtotal,
        cgst: totals.cgst,
        sgst: totals.sgst,
        igst: totals.igst,
        total: totals.total,
        balance: totals.total,
        status: CreditNoteStatus::Issued,
        idempotency_key: input.idempotency_key.clone(),
        journal_entry_id: Some(posted.journal_entry_id),
        created_at: env.clock.now(),
    };
    if let Err(err) = tx.insert_credit_note(credit_note.clone()).await {
        if err.violates(CREDIT_NOTE_IDEMPOTENCY_CONSTRAINT) {
            if let Some(key) = input.idempotency_key.as_deref() {
                if let Some(winner) = tx.find_credit_note_by_idempotency_key(org_id, key).await? {
                    return Ok(CreditNoteOutcome::from_credit_note(&winner));
                }
            }
        }
        return Err(err.into());
    }
    tx.adjust_customer_balance(org_id, customer.id, -credit_note.total).await?;

    env.events.record(
        DomainEvent::new(org_id, "credit_note.issued", "credit_note", credit_note.id).with_detail(
            serde_json::json!({
                "credit_note_number": number,
                "total": credit_note.total,
            }),
        ),
    );

    Ok(CreditNoteOutcome::from_credit_note(&credit_note))
}

// ---- internals -------------------------------------------------------

fn settle_status(balance_due: Decimal) -> InvoiceStatus {
    if money::is_effectively_zero(balance_due) {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::PartiallyPaid
    }
}

fn compute_lines(
    env: &WorkflowEnv<'_>,
    inputs: &[InvoiceLineInput],
    ctx: &TaxContext,
) -> Result<(Vec<InvoiceLine>, InvoiceTaxTotals), BillingError> {
    let tax_lines: Vec<TaxLine> = inputs
        .iter()
        .map(|l| TaxLine { quantity: l.quantity, rate: l.rate, gst_rate: l.gst_rate })
        .collect();
    let totals = calculate_invoice_tax_totals(&tax_lines, ctx)?;

    let mut lines = Vec::with_capacity(inputs.len());
    for (input, tax_line) in inputs.iter().zip(&tax_lines) {
        let breakdown = calculate_line_tax(tax_line, ctx)?;
        lines.push(InvoiceLine::from_breakdown(
            env.ids.next(),
            input.description.clone(),
            input.quantity,
            input.rate,
            input.gst_rate,
            &breakdown,
        ));
    }
    Ok((lines, totals))
}

/// Appends the nonzero GST legs. `debit` flips the side for
/// reversing-style documents (credit notes).
fn push_gst_legs(lines: &mut Vec<PostingLine>, totals: &InvoiceTaxTotals, debit: bool) {
    let mut leg = |code: &str, amount: Decimal| {
        if amount > Decimal::ZERO {
            lines.push(if debit {
                PostingLine::debit(code, amount)
            } else {
                PostingLine::credit(code, amount)
            });
        }
    };
    leg(codes::OUTPUT_CGST, totals.cgst);
    leg(codes::OUTPUT_SGST, totals.sgst);
    leg(codes::OUTPUT_IGST, totals.igst);
}

async fn post_invoice_entry<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    invoice: &Invoice,
    created_by: Option<UserId>,
) -> Result<JournalEntryId, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let number = invoice.invoice_number.as_deref().unwrap_or("(unnumbered)");
    let totals = InvoiceTaxTotals {
        subtotal: invoice.subtotal,
        cgst: invoice.cgst,
        sgst: invoice.sgst,
        igst: invoice.igst,
        total_tax: money::add(&[invoice.cgst, invoice.sgst, invoice.igst]),
        total: invoice.total,
    };

    let mut lines = vec![PostingLine::debit(codes::ACCOUNTS_RECEIVABLE, invoice.total)
        .for_party(PartyRef::Customer(invoice.customer_id))];
    lines.push(PostingLine::credit(codes::SALES, invoice.subtotal));
    push_gst_legs(&mut lines, &totals, false);

    let posted = post(
        tx,
        env,
        org_id,
        PostingInput {
            date: invoice.date,
            narration: format!("Invoice {number}"),
            reference: Some(DocumentRef::new("invoice", *invoice.id.as_uuid())),
            lines,
            created_by,
        },
    )
    .await?;
    Ok(posted.journal_entry_id)
}

async fn post_advance_application<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    invoice: &Invoice,
    advance: &Advance,
    amount: Decimal,
) -> Result<(), BillingError>
where
    S: SettlementTx + ?Sized,
{
    let number = invoice.invoice_number.as_deref().unwrap_or("(unnumbered)");
    post(
        tx,
        env,
        org_id,
        PostingInput {
            date: env.clock.today_ist(),
            narration: format!("Advance applied to {number}"),
            reference: Some(DocumentRef::new("advance", *advance.id.as_uuid())),
            lines: vec![
                PostingLine::debit(codes::CUSTOMER_ADVANCES, amount),
                PostingLine::credit(codes::ACCOUNTS_RECEIVABLE, amount)
                    .for_party(PartyRef::Customer(invoice.customer_id)),
            ],
            created_by: None,
        },
    )
    .await?;
    Ok(())
}

async fn record_allocation<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    source: AllocationSource,
    invoice_id: InvoiceId,
    amount: Decimal,
) -> Result<(), BillingError>
where
    S: SettlementTx + ?Sized,
{
    tx.insert_allocation(Allocation {
        id: AllocationId::from_uuid(env.ids.next()),
        org_id,
        source,
        invoice_id,
        amount,
        allocated_at: env.clock.now(),
    })
    .await?;
    Ok(())
}

async fn bank_advance<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    customer_id: CustomerId,
    amount: Decimal,
    source_payment_id: Option<PaymentId>,
) -> Result<AdvanceId, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let advance = Advance {
        id: AdvanceId::from_uuid(env.ids.next()),
        org_id,
        customer_id,
        amount,
        balance: amount,
        source_payment_id,
        created_at: env.clock.now(),
    };
    let id = advance.id;
    tx.insert_advance(advance).await?;
    Ok(id)
}

/// Cash receipt against one invoice: applied portion allocated, excess
/// banked as an advance. The invoice may already be paid (combined
/// settlements), in which case the whole amount becomes an advance.
#[allow(clippy::too_many_arguments)]
async fn apply_cash_to_invoice<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    invoice: Invoice,
    amount: Decimal,
    date: NaiveDate,
    method: PaymentMethod,
    reference: Option<String>,
    idempotency_key: Option<String>,
    created_by: Option<UserId>,
) -> Result<PaymentOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let open = invoice.status.is_open();
    let applied = if open { money::round2(amount.min(invoice.balance_due)) } else { Decimal::ZERO };
    let excess = money::subtract(amount, applied);

    let number = next_number(
        tx,
        env.clock,
        org_id,
        DocModule::Payment,
        Some(FiscalYear::from_date(date)),
    )
    .await?;

    let mut lines = vec![PostingLine::debit(codes::CASH, amount)];
    if applied > Decimal::ZERO {
        lines.push(
            PostingLine::credit(codes::ACCOUNTS_RECEIVABLE, applied)
                .for_party(PartyRef::Customer(invoice.customer_id)),
        );
    }
    if !money::is_effectively_zero(excess) {
        lines.push(PostingLine::credit(codes::CUSTOMER_ADVANCES, excess));
    }

    let payment_id = PaymentId::from_uuid(env.ids.next());
    let posted = post(
        tx,
        env,
        org_id,
        PostingInput {
            date,
            narration: format!("Payment {number} received"),
            reference: Some(DocumentRef::new("payment", *payment_id.as_uuid())),
            lines,
            created_by,
        },
    )
    .await?;

    let payment = Payment {
        id: payment_id,
        org_id,
        customer_id: invoice.customer_id,
        payment_number: number.clone(),
        date,
        amount,
        method,
        reference,
        idempotency_key: idempotency_key.clone(),
        journal_entry_id: Some(posted.journal_entry_id),
        created_at: env.clock.now(),
    };
    if let Err(err) = tx.insert_payment(payment).await {
        if err.violates(PAYMENT_IDEMPOTENCY_CONSTRAINT) {
            if let Some(key) = idempotency_key.as_deref() {
                if let Some(winner) = tx.find_payment_by_idempotency_key(org_id, key).await? {
                    return replay_payment_outcome(tx, org_id, winner.id, invoice.id).await;
                }
            }
        }
        return Err(err.into());
    }

    let mut invoice_status = invoice.status;
    if applied > Decimal::ZERO {
        record_allocation(tx, env, org_id, AllocationSource::Payment(payment_id), invoice.id, applied)
            .await?;
        let new_due = money::subtract(invoice.balance_due, applied);
        invoice_status = settle_status(new_due);
        tx.set_invoice_settlement(org_id, invoice.id, new_due, invoice_status).await?;
        tx.adjust_customer_balance(org_id, invoice.customer_id, -applied).await?;
    }

    let advance_id = if money::is_effectively_zero(excess) {
        None
    } else {
        Some(bank_advance(tx, env, org_id, invoice.customer_id, excess, Some(payment_id)).await?)
    };

    env.events.record(
        DomainEvent::new(org_id, "payment.recorded", "payment", payment_id).with_detail(
            serde_json::json!({
                "payment_number": number,
                "amount": amount,
                "applied": applied,
                "advance": excess,
            }),
        ),
    );
    if invoice_status == InvoiceStatus::Paid {
        env.events.record(
            DomainEvent::new(org_id, "invoice.settled", "invoice", invoice.id)
                .with_detail(serde_json::json!({ "invoice_number": invoice.invoice_number })),
        );
    }

    Ok(PaymentOutcome {
        payment_id,
        payment_number: number,
        amount,
        applied,
        advance_amount: excess,
        advance_id,
        invoice_status,
    })
}

/// Rebuilds the outcome of an earlier payment for an idempotent replay.
async fn replay_payment_outcome<S>(
    tx: &mut S,
    org_id: OrgId,
    payment_id: PaymentId,
    invoice_id: InvoiceId,
) -> Result<PaymentOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let payment = tx
        .get_payment(org_id, payment_id)
        .await?
        .ok_or_else(|| StoreError::not_found("Payment", payment_id))?;
    let allocations = tx
        .find_allocations_for_source(org_id, AllocationSource::Payment(payment_id))
        .await?;
    let applied = money::add(&allocations.iter().map(|a| a.amount).collect::<Vec<_>>());
    let invoice = tx
        .get_invoice(org_id, invoice_id)
        .await?
        .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

    Ok(PaymentOutcome {
        payment_id,
        payment_number: payment.payment_number,
        amount: payment.amount,
        applied,
        advance_amount: money::subtract(payment.amount, applied),
        advance_id: None,
        invoice_status: invoice.status,
    })
}

/// Rebuilds the outcome of an earlier customer payment for a replay.
async fn replay_customer_payment_outcome<S>(
    tx: &mut S,
    org_id: OrgId,
    payment_id: PaymentId,
) -> Result<CustomerPaymentOutcome, BillingError>
where
    S: SettlementTx + ?Sized,
{
    let payment = tx
        .get_payment(org_id, payment_id)
        .await?
        .ok_or_else(|| StoreError::not_found("Payment", payment_id))?;
    let allocations = tx
        .find_allocations_for_source(org_id, AllocationSource::Payment(payment_id))
        .await?;
    let allocated_total = money::add(&allocations.iter().map(|a| a.amount).collect::<Vec<_>>());

    Ok(CustomerPaymentOutcome {
        payment_id,
        payment_number: payment.payment_number,
        amount: payment.amount,
        allocated_total,
        allocations: allocations.iter().map(|a| (a.invoice_id, a.amount)).collect(),
        advance_amount: money::subtract(payment.amount, allocated_total),
        advance_id: None,
    })
}
