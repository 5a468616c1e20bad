//! Billing Domain - financial documents and settlement workflows
//!
//! Invoices, payments, credit notes, and advances, plus the
//! transactional workflows that issue, settle, and cancel them. Every
//! workflow runs inside one transaction handle that also carries the
//! ledger and number-series ports, so the journal posting, the document
//! row, and every denormalized balance commit or roll back together.

pub mod advance;
pub mod allocation;
pub mod credit_note;
pub mod customer;
pub mod error;
pub mod idempotency;
pub mod invoice;
pub mod memory;
pub mod payment;
pub mod settlement;
pub mod store;

pub use advance::Advance;
pub use allocation::{Allocation, AllocationSource, CreditSource, CreditSourceRequest};
pub use credit_note::{CreditNote, CreditNoteStatus};
pub use customer::{is_inter_state, Customer, Organization};
pub use error::{BillingError, ErrorKind};
pub use idempotency::{check_idempotency, DocKind, ExistingDocument};
pub use invoice::{Invoice, InvoiceLine, InvoiceStatus};
pub use memory::MemoryTx;
pub use payment::{Payment, PaymentMethod};
pub use settlement::{
    apply_credits_to_invoice_in_tx, cancel_invoice_in_tx, create_credit_note_in_tx,
    create_customer_payment_in_tx, create_invoice_in_tx, issue_draft_invoice_in_tx,
    record_invoice_payment_in_tx, settle_invoice_in_tx, update_draft_invoice_in_tx,
    AppliedCredit, CreateCreditNoteInput, CreateCustomerPaymentInput, CreateInvoiceInput,
    CreditApplication, CreditNoteOutcome, CustomerPaymentOutcome, InvoiceLineInput,
    InvoiceOutcome, PaymentAllocationRequest, PaymentOutcome, RecordInvoicePaymentInput,
    SettleInvoiceInput, SettlementOutcome, UpdateDraftInvoiceInput,
};
pub use store::{BillingStore, SettlementTx};
