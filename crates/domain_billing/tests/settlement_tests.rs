//! Settlement workflow tests over the in-memory transaction

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{
    money, CustomerId, FixedClock, MemoryEventLogger, OrgId, SequentialIds, WorkflowEnv,
};
use domain_billing::{
    apply_credits_to_invoice_in_tx, cancel_invoice_in_tx, create_credit_note_in_tx,
    create_customer_payment_in_tx, create_invoice_in_tx, issue_draft_invoice_in_tx,
    record_invoice_payment_in_tx, settle_invoice_in_tx, update_draft_invoice_in_tx,
    BillingError, BillingStore, CreateCreditNoteInput, CreateCustomerPaymentInput,
    CreateInvoiceInput, CreditNoteStatus, CreditSource, CreditSourceRequest, Customer,
    ErrorKind, InvoiceLineInput, InvoiceStatus, MemoryTx, Organization,
    PaymentAllocationRequest, PaymentMethod, RecordInvoicePaymentInput, SettleInvoiceInput,
    UpdateDraftInvoiceInput,
};
use domain_ledger::{codes, LedgerStore};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
}

struct Harness {
    org: OrgId,
    customer: CustomerId,
    tx: MemoryTx,
    clock: FixedClock,
    ids: SequentialIds,
    events: MemoryEventLogger,
}

impl Harness {
    fn new() -> Self {
        Self::with_customer_state("27")
    }

    /// Org is in state 27; a differing customer state makes the supply
    /// inter-state.
    fn with_customer_state(customer_state: &str) -> Self {
        let org_id = OrgId::new();
        let org = Organization {
            id: org_id,
            name: "Acme Traders".to_string(),
            gstin: Some("27AAAAA0000A1Z5".to_string()),
            state_code: "27".to_string(),
            prices_include_gst: false,
        };
        let customer = Customer::new(org_id, "Sharma Industries", customer_state);
        let customer_id = customer.id;
        Self {
            org: org_id,
            customer: customer_id,
            tx: MemoryTx::for_org(org, vec![customer]),
            clock: FixedClock::on_ist_date(today()),
            ids: SequentialIds::default(),
            events: MemoryEventLogger::new(),
        }
    }
}

fn line(rate: Decimal, gst_rate: Decimal) -> InvoiceLineInput {
    InvoiceLineInput {
        description: "Services".to_string(),
        quantity: dec!(1),
        rate,
        gst_rate,
    }
}

fn invoice_input(h: &Harness, lines: Vec<InvoiceLineInput>) -> CreateInvoiceInput {
    CreateInvoiceInput {
        customer_id: h.customer,
        date: Some(today()),
        lines,
        prices_include_gst: None,
        manual_number: None,
        issue: true,
        idempotency_key: None,
        created_by: None,
    }
}

async fn account_balance(tx: &mut MemoryTx, org: OrgId, code: &str) -> Decimal {
    tx.find_account_by_code(org, code).await.unwrap().unwrap().balance
}

async fn customer_balance(tx: &mut MemoryTx, org: OrgId, customer: CustomerId) -> Decimal {
    tx.get_customer(org, customer).await.unwrap().unwrap().balance
}

#[tokio::test]
async fn test_issue_invoice_posts_entry_and_moves_balances() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(2500), dec!(18)); 1]);
    let outcome = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    assert_eq!(outcome.invoice_number.as_deref(), Some("INV-2024-25-0001"));
    assert_eq!(outcome.status, InvoiceStatus::Issued);
    assert_eq!(outcome.subtotal, dec!(2500.00));
    assert_eq!(outcome.cgst, dec!(225.00));
    assert_eq!(outcome.sgst, dec!(225.00));
    assert_eq!(outcome.igst, dec!(0));
    assert_eq!(outcome.total, dec!(2950.00));
    assert!(!outcome.is_inter_state);
    assert!(outcome.journal_entry_id.is_some());

    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(2950.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::SALES).await, dec!(-2500.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::OUTPUT_CGST).await, dec!(-225.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::OUTPUT_SGST).await, dec!(-225.00));
    assert_eq!(customer_balance(&mut h.tx, h.org, h.customer).await, dec!(2950.00));
    assert!(h.events.actions().contains(&"invoice.issued".to_string()));
}

#[tokio::test]
async fn test_inter_state_invoice_uses_igst() {
    let mut h = Harness::with_customer_state("07");
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(18))]);
    let outcome = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    assert!(outcome.is_inter_state);
    assert_eq!(outcome.igst, dec!(180.00));
    assert_eq!(outcome.cgst, dec!(0));
    assert_eq!(outcome.sgst, dec!(0));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::OUTPUT_IGST).await, dec!(-180.00));
}

#[tokio::test]
async fn test_invoice_idempotency_round_trip() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let mut input = invoice_input(&h, vec![line(dec!(1000), dec!(18))]);
    input.idempotency_key = Some("req-42".to_string());

    let first = create_invoice_in_tx(&mut h.tx, &env, h.org, input.clone()).await.unwrap();
    let second = create_invoice_in_tx(&mut h.tx, &env, h.org, input).await.unwrap();

    assert_eq!(first.invoice_id, second.invoice_id);
    assert_eq!(first.invoice_number, second.invoice_number);
    assert_eq!(h.tx.invoice_count(), 1);
    // No second posting happened.
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(1180.00));
}

#[tokio::test]
async fn test_draft_lifecycle() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let mut input = invoice_input(&h, vec![line(dec!(500), dec!(18))]);
    input.issue = false;
    let draft = create_invoice_in_tx(&mut h.tx, &env, h.org, input).await.unwrap();

    assert_eq!(draft.status, InvoiceStatus::Draft);
    assert_eq!(draft.invoice_number, None);
    assert_eq!(draft.journal_entry_id, None);
    // Drafts carry no ledger effect.
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(0));

    let updated = update_draft_invoice_in_tx(
        &mut h.tx,
        &env,
        h.org,
        draft.invoice_id,
        UpdateDraftInvoiceInput {
            lines: Some(vec![line(dec!(800), dec!(18))]),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.total, dec!(944.00));

    let issued = issue_draft_invoice_in_tx(&mut h.tx, &env, h.org, draft.invoice_id, None, None)
        .await
        .unwrap();
    assert_eq!(issued.status, InvoiceStatus::Issued);
    assert_eq!(issued.invoice_number.as_deref(), Some("INV-2024-25-0001"));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(944.00));

    // A second issue attempt is rejected.
    let err = issue_draft_invoice_in_tx(&mut h.tx, &env, h.org, draft.invoice_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvoiceNotDraft { .. }));
}

#[tokio::test]
async fn test_manual_number_bumps_series() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let mut input = invoice_input(&h, vec![line(dec!(100), dec!(0))]);
    input.manual_number = Some("INV-2024-25-0007".to_string());
    create_invoice_in_tx(&mut h.tx, &env, h.org, input).await.unwrap();

    let input = invoice_input(&h, vec![line(dec!(100), dec!(0))]);
    let next = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    assert_eq!(next.invoice_number.as_deref(), Some("INV-2024-25-0008"));
}

#[tokio::test]
async fn test_cancel_issued_invoice_reverses_entry() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(18))]);
    let outcome = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let cancelled =
        cancel_invoice_in_tx(&mut h.tx, &env, h.org, outcome.invoice_id, None).await.unwrap();
    assert_eq!(cancelled.status, InvoiceStatus::Cancelled);

    // Ledger and customer balance are wound back to zero.
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(0.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::SALES).await, dec!(0.00));
    assert_eq!(customer_balance(&mut h.tx, h.org, h.customer).await, dec!(0.00));
    assert!(h.events.actions().contains(&"invoice.cancelled".to_string()));

    let entry = h
        .tx
        .get_journal_entry(h.org, outcome.journal_entry_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, domain_ledger::EntryStatus::Reversed);
}

#[tokio::test]
async fn test_cancel_paid_invoice_rejected() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(0))]);
    let outcome = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    record_invoice_payment_in_tx(
        &mut h.tx,
        &env,
        h.org,
        RecordInvoicePaymentInput {
            invoice_id: outcome.invoice_id,
            amount: dec!(1000),
            date: None,
            method: PaymentMethod::BankTransfer,
            reference: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    let err = cancel_invoice_in_tx(&mut h.tx, &env, h.org, outcome.invoice_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::CannotCancel { status: InvoiceStatus::Paid }));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_payment_excess_banked_as_advance() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(0))]);
    let outcome = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let payment = record_invoice_payment_in_tx(
        &mut h.tx,
        &env,
        h.org,
        RecordInvoicePaymentInput {
            invoice_id: outcome.invoice_id,
            amount: dec!(1500),
            date: None,
            method: PaymentMethod::Upi,
            reference: Some("UPI-123".to_string()),
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(payment.applied, dec!(1000.00));
    assert_eq!(payment.advance_amount, dec!(500.00));
    assert_eq!(payment.invoice_status, InvoiceStatus::Paid);
    let advance_id = payment.advance_id.unwrap();

    assert_eq!(account_balance(&mut h.tx, h.org, codes::CASH).await, dec!(1500.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(0.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::CUSTOMER_ADVANCES).await, dec!(-500.00));

    let advance = h.tx.get_advance(h.org, advance_id).await.unwrap().unwrap();
    assert_eq!(advance.balance, dec!(500.00));
    assert_eq!(advance.source_payment_id, Some(payment.payment_id));
}

#[tokio::test]
async fn test_advance_application_posts_entry() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    // Overpay the first invoice to create an advance of 500.
    let input = invoice_input(&h, vec![line(dec!(1000), dec!(0))]);
    let first = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    let payment = record_invoice_payment_in_tx(
        &mut h.tx,
        &env,
        h.org,
        RecordInvoicePaymentInput {
            invoice_id: first.invoice_id,
            amount: dec!(1500),
            date: None,
            method: PaymentMethod::Cash,
            reference: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();
    let advance_id = payment.advance_id.unwrap();

    let input = invoice_input(&h, vec![line(dec!(300), dec!(0))]);
    let second = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let application = apply_credits_to_invoice_in_tx(
        &mut h.tx,
        &env,
        h.org,
        second.invoice_id,
        vec![CreditSourceRequest { source: CreditSource::Advance(advance_id), amount: None }],
    )
    .await
    .unwrap();

    assert_eq!(application.applied_total, dec!(300.00));
    assert_eq!(application.invoice_status, InvoiceStatus::Paid);

    let advance = h.tx.get_advance(h.org, advance_id).await.unwrap().unwrap();
    assert_eq!(advance.balance, dec!(200.00));
    // Dr Advances / Cr AR moved both liability and receivable.
    assert_eq!(account_balance(&mut h.tx, h.org, codes::CUSTOMER_ADVANCES).await, dec!(-200.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(0.00));
}

#[tokio::test]
async fn test_settlement_scenario_credit_note_plus_cash() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    assert_eq!(invoice.total, dec!(1000.00));

    let credit_note = create_credit_note_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCreditNoteInput {
            customer_id: h.customer,
            invoice_id: Some(invoice.invoice_id),
            reason: Some("Rate correction".to_string()),
            date: Some(today()),
            lines: vec![line(dec!(400), dec!(0))],
            prices_include_gst: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(credit_note.total, dec!(400.00));
    assert_eq!(credit_note.status, CreditNoteStatus::Issued);

    let settlement = settle_invoice_in_tx(
        &mut h.tx,
        &env,
        h.org,
        SettleInvoiceInput {
            invoice_id: invoice.invoice_id,
            credits: vec![CreditSourceRequest {
                source: CreditSource::CreditNote(credit_note.credit_note_id),
                amount: None,
            }],
            payment_amount: Some(dec!(600)),
            date: None,
            method: PaymentMethod::BankTransfer,
            reference: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(settlement.invoice_status, InvoiceStatus::Paid);
    assert_eq!(settlement.credits.applied_total, dec!(400.00));
    let payment = settlement.payment.unwrap();
    assert_eq!(payment.applied, dec!(600.00));
    assert_eq!(payment.advance_amount, dec!(0.00));

    let settled = h.tx.get_invoice(h.org, invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(settled.balance_due, dec!(0.00));
    assert_eq!(settled.status, InvoiceStatus::Paid);

    let cn = h.tx.get_credit_note(h.org, credit_note.credit_note_id).await.unwrap().unwrap();
    assert_eq!(cn.balance, dec!(0.00));
    assert_eq!(cn.status, CreditNoteStatus::Applied);

    // AR: +1000 (invoice) -400 (credit note) -600 (payment) = 0.
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(0.00));
    assert!(h.events.actions().contains(&"invoice.settled".to_string()));
}

#[tokio::test]
async fn test_allocation_cap_rejected_before_persistence() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(500), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    let credit_note = create_credit_note_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCreditNoteInput {
            customer_id: h.customer,
            invoice_id: None,
            reason: None,
            date: Some(today()),
            lines: vec![line(dec!(800), dec!(0))],
            prices_include_gst: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    let err = apply_credits_to_invoice_in_tx(
        &mut h.tx,
        &env,
        h.org,
        invoice.invoice_id,
        vec![CreditSourceRequest {
            source: CreditSource::CreditNote(credit_note.credit_note_id),
            amount: Some(dec!(700)),
        }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BillingError::OverAllocation { .. }));

    // Nothing was persisted: the credit note and invoice are untouched.
    let cn = h.tx.get_credit_note(h.org, credit_note.credit_note_id).await.unwrap().unwrap();
    assert_eq!(cn.balance, dec!(800.00));
    assert_eq!(cn.status, CreditNoteStatus::Issued);
    let inv = h.tx.get_invoice(h.org, invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(inv.balance_due, dec!(500.00));
    assert!(h.tx.allocations().is_empty());
}

#[tokio::test]
async fn test_requested_amount_above_source_balance_rejected() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    let credit_note = create_credit_note_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCreditNoteInput {
            customer_id: h.customer,
            invoice_id: None,
            reason: None,
            date: Some(today()),
            lines: vec![line(dec!(200), dec!(0))],
            prices_include_gst: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    let err = apply_credits_to_invoice_in_tx(
        &mut h.tx,
        &env,
        h.org,
        invoice.invoice_id,
        vec![CreditSourceRequest {
            source: CreditSource::CreditNote(credit_note.credit_note_id),
            amount: Some(dec!(300)),
        }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BillingError::SourceInsufficient { .. }));
}

#[tokio::test]
async fn test_repeated_source_cannot_overdraw_its_balance() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(18))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    assert_eq!(invoice.total, dec!(1180.00));
    let credit_note = create_credit_note_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCreditNoteInput {
            customer_id: h.customer,
            invoice_id: None,
            reason: None,
            date: Some(today()),
            lines: vec![line(dec!(400), dec!(18))],
            prices_include_gst: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(credit_note.total, dec!(472.00));

    // Two 300s name the same 472 note; the second draws from its
    // running balance and must be rejected.
    let source = CreditSource::CreditNote(credit_note.credit_note_id);
    let err = apply_credits_to_invoice_in_tx(
        &mut h.tx,
        &env,
        h.org,
        invoice.invoice_id,
        vec![
            CreditSourceRequest { source, amount: Some(dec!(300)) },
            CreditSourceRequest { source, amount: Some(dec!(300)) },
        ],
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        BillingError::SourceInsufficient { requested, available }
            if requested == dec!(300.00) && available == dec!(172.00)
    ));

    // Nothing persisted, note balance never went negative.
    let cn = h.tx.get_credit_note(h.org, credit_note.credit_note_id).await.unwrap().unwrap();
    assert_eq!(cn.balance, dec!(472.00));
    let inv = h.tx.get_invoice(h.org, invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(inv.balance_due, dec!(1180.00));
    assert!(h.tx.allocations().is_empty());
}

#[tokio::test]
async fn test_repeated_open_ended_source_applies_once() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    let credit_note = create_credit_note_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCreditNoteInput {
            customer_id: h.customer,
            invoice_id: None,
            reason: None,
            date: Some(today()),
            lines: vec![line(dec!(400), dec!(0))],
            prices_include_gst: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    // The first open-ended request drains the note; the duplicate sees
    // a zero running balance and is skipped.
    let source = CreditSource::CreditNote(credit_note.credit_note_id);
    let application = apply_credits_to_invoice_in_tx(
        &mut h.tx,
        &env,
        h.org,
        invoice.invoice_id,
        vec![
            CreditSourceRequest { source, amount: None },
            CreditSourceRequest { source, amount: None },
        ],
    )
    .await
    .unwrap();

    assert_eq!(application.applied_total, dec!(400.00));
    assert_eq!(application.applied.len(), 1);
    let cn = h.tx.get_credit_note(h.org, credit_note.credit_note_id).await.unwrap().unwrap();
    assert_eq!(cn.balance, dec!(0.00));
    assert_eq!(cn.status, CreditNoteStatus::Applied);
    let inv = h.tx.get_invoice(h.org, invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(inv.balance_due, dec!(600.00));
}

#[tokio::test]
async fn test_customer_payment_distributes_and_banks_remainder() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(300), dec!(0))]);
    let first = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    let input = invoice_input(&h, vec![line(dec!(500), dec!(0))]);
    let second = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let outcome = create_customer_payment_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCustomerPaymentInput {
            customer_id: h.customer,
            amount: dec!(1000),
            date: None,
            method: PaymentMethod::BankTransfer,
            reference: None,
            allocations: vec![
                PaymentAllocationRequest { invoice_id: first.invoice_id, amount: dec!(300) },
                PaymentAllocationRequest { invoice_id: second.invoice_id, amount: dec!(500) },
            ],
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.payment_number, "PAY-2024-25-0001");
    assert_eq!(outcome.allocated_total, dec!(800.00));
    assert_eq!(outcome.advance_amount, dec!(200.00));
    assert!(outcome.advance_id.is_some());

    let first_inv = h.tx.get_invoice(h.org, first.invoice_id).await.unwrap().unwrap();
    let second_inv = h.tx.get_invoice(h.org, second.invoice_id).await.unwrap().unwrap();
    assert_eq!(first_inv.status, InvoiceStatus::Paid);
    assert_eq!(second_inv.status, InvoiceStatus::Paid);

    assert_eq!(account_balance(&mut h.tx, h.org, codes::CASH).await, dec!(1000.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(0.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::CUSTOMER_ADVANCES).await, dec!(-200.00));
}

#[tokio::test]
async fn test_customer_payment_allocations_cannot_exceed_amount() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(500), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let err = create_customer_payment_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCustomerPaymentInput {
            customer_id: h.customer,
            amount: dec!(100),
            date: None,
            method: PaymentMethod::Cash,
            reference: None,
            allocations: vec![PaymentAllocationRequest {
                invoice_id: invoice.invoice_id,
                amount: dec!(500),
            }],
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BillingError::AllocationExceedsPayment { .. }));
    assert_eq!(h.tx.payment_count(), 0);
}

#[tokio::test]
async fn test_customer_payment_duplicate_invoice_target_caps_at_balance_due() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(100), dec!(18))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    assert_eq!(invoice.total, dec!(118.00));

    // The same 118 invoice named twice: the second allocation sees a
    // zero running due and the unapplied half is banked as an advance.
    let outcome = create_customer_payment_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCustomerPaymentInput {
            customer_id: h.customer,
            amount: dec!(236),
            date: None,
            method: PaymentMethod::BankTransfer,
            reference: None,
            allocations: vec![
                PaymentAllocationRequest { invoice_id: invoice.invoice_id, amount: dec!(118) },
                PaymentAllocationRequest { invoice_id: invoice.invoice_id, amount: dec!(118) },
            ],
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.allocated_total, dec!(118.00));
    assert_eq!(outcome.allocations.len(), 1);
    assert_eq!(outcome.advance_amount, dec!(118.00));
    assert!(outcome.advance_id.is_some());

    let inv = h.tx.get_invoice(h.org, invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(inv.status, InvoiceStatus::Paid);
    assert_eq!(inv.balance_due, dec!(0.00));

    // AR is credited only what the invoice owed.
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(0.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::CASH).await, dec!(236.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::CUSTOMER_ADVANCES).await, dec!(-118.00));
}

#[tokio::test]
async fn test_credit_note_issuance_moves_ledger_and_customer() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(18))]);
    create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let cn = create_credit_note_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCreditNoteInput {
            customer_id: h.customer,
            invoice_id: None,
            reason: Some("Damaged goods".to_string()),
            date: Some(today()),
            lines: vec![line(dec!(200), dec!(18))],
            prices_include_gst: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(cn.credit_note_number, "CN-2024-25-0001");
    assert_eq!(cn.total, dec!(236.00));
    assert_eq!(cn.balance, dec!(236.00));

    // Invoice posted +1180 AR/-1000 sales/-180 GST; the note winds back 236.
    assert_eq!(account_balance(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(944.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::SALES).await, dec!(-800.00));
    assert_eq!(account_balance(&mut h.tx, h.org, codes::OUTPUT_CGST).await, dec!(-72.00));
    assert_eq!(customer_balance(&mut h.tx, h.org, h.customer).await, dec!(944.00));
    assert!(h.events.actions().contains(&"credit_note.issued".to_string()));
}

#[tokio::test]
async fn test_zero_payment_amount_rejected() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(100), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let err = record_invoice_payment_in_tx(
        &mut h.tx,
        &env,
        h.org,
        RecordInvoicePaymentInput {
            invoice_id: invoice.invoice_id,
            amount: dec!(0),
            date: None,
            method: PaymentMethod::Cash,
            reference: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BillingError::AmountNotPositive { .. }));
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_payment_idempotency_replay() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let input = RecordInvoicePaymentInput {
        invoice_id: invoice.invoice_id,
        amount: dec!(1000),
        date: None,
        method: PaymentMethod::BankTransfer,
        reference: None,
        idempotency_key: Some("pay-once".to_string()),
        created_by: None,
    };
    let first = record_invoice_payment_in_tx(&mut h.tx, &env, h.org, input.clone())
        .await
        .unwrap();
    let second = record_invoice_payment_in_tx(&mut h.tx, &env, h.org, input).await.unwrap();

    assert_eq!(first.payment_id, second.payment_id);
    assert_eq!(second.payment_number, first.payment_number);
    assert_eq!(second.applied, dec!(1000.00));
    assert_eq!(h.tx.payment_count(), 1);
    // Cash was received exactly once.
    assert_eq!(account_balance(&mut h.tx, h.org, codes::CASH).await, dec!(1000.00));
}

#[tokio::test]
async fn test_partial_payment_leaves_invoice_partially_paid() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let outcome = record_invoice_payment_in_tx(
        &mut h.tx,
        &env,
        h.org,
        RecordInvoicePaymentInput {
            invoice_id: invoice.invoice_id,
            amount: dec!(400),
            date: None,
            method: PaymentMethod::Cash,
            reference: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.invoice_status, InvoiceStatus::PartiallyPaid);
    let inv = h.tx.get_invoice(h.org, invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(inv.balance_due, dec!(600.00));
    assert_eq!(customer_balance(&mut h.tx, h.org, h.customer).await, dec!(600.00));
}

#[tokio::test]
async fn test_below_epsilon_allocations_are_skipped() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(100), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();
    // An exhausted credit note: issue 50 and fully apply it first.
    let cn = create_credit_note_in_tx(
        &mut h.tx,
        &env,
        h.org,
        CreateCreditNoteInput {
            customer_id: h.customer,
            invoice_id: None,
            reason: None,
            date: Some(today()),
            lines: vec![line(dec!(50), dec!(0))],
            prices_include_gst: None,
            idempotency_key: None,
            created_by: None,
        },
    )
    .await
    .unwrap();
    apply_credits_to_invoice_in_tx(
        &mut h.tx,
        &env,
        h.org,
        invoice.invoice_id,
        vec![CreditSourceRequest {
            source: CreditSource::CreditNote(cn.credit_note_id),
            amount: None,
        }],
    )
    .await
    .unwrap();

    // Applying the drained note again allocates nothing and errors
    // nowhere.
    let application = apply_credits_to_invoice_in_tx(
        &mut h.tx,
        &env,
        h.org,
        invoice.invoice_id,
        vec![CreditSourceRequest {
            source: CreditSource::CreditNote(cn.credit_note_id),
            amount: None,
        }],
    )
    .await
    .unwrap();
    assert_eq!(application.applied_total, dec!(0));
    assert_eq!(application.invoice_status, InvoiceStatus::PartiallyPaid);
    assert_eq!(application.balance_due, dec!(50.00));
}

#[tokio::test]
async fn test_empty_credit_application_leaves_invoice_untouched() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = invoice_input(&h, vec![line(dec!(1000), dec!(0))]);
    let invoice = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
    .await
    .unwrap();

    let application =
        apply_credits_to_invoice_in_tx(&mut h.tx, &env, h.org, invoice.invoice_id, Vec::new())
            .await
            .unwrap();

    // No sources, no writes: the invoice stays Issued.
    assert_eq!(application.applied_total, dec!(0));
    assert_eq!(application.invoice_status, InvoiceStatus::Issued);
    assert_eq!(application.balance_due, dec!(1000.00));
    let inv = h.tx.get_invoice(h.org, invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(inv.status, InvoiceStatus::Issued);
    assert_eq!(inv.balance_due, dec!(1000.00));
    assert!(h.tx.allocations().is_empty());
}

#[tokio::test]
async fn test_money_arithmetic_survives_many_lines() {
    // 30 lines at 33.33 with 18% GST: totals must come from the decimal
    // adder, not drift.
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let lines = vec![line(dec!(33.33), dec!(18)); 30];
    let input = invoice_input(&h, lines);
    let outcome = create_invoice_in_tx(&mut h.tx, &env, h.org, input)
        .await
        .unwrap();

    assert_eq!(outcome.subtotal, dec!(999.90));
    assert_eq!(outcome.total, money::add(&[outcome.subtotal, outcome.cgst, outcome.sgst]));
    assert_eq!(outcome.cgst + outcome.sgst, dec!(180.00));
}
