//! Workflow-input builders
//!
//! Each builder starts from a valid input and lets a test override only
//! what it is actually exercising.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{CustomerId, InvoiceId};
use domain_billing::{
    CreateCreditNoteInput, CreateInvoiceInput, InvoiceLineInput, PaymentMethod,
    RecordInvoicePaymentInput,
};

use crate::fixtures::mid_fiscal_year;

/// One invoice line; `line(1000, 18)` is the common case.
pub fn line(rate: Decimal, gst_rate: Decimal) -> InvoiceLineInput {
    InvoiceLineInput {
        description: "Services".to_string(),
        quantity: dec!(1),
        rate,
        gst_rate,
    }
}

pub struct InvoiceInputBuilder {
    input: CreateInvoiceInput,
}

impl InvoiceInputBuilder {
    /// An issued single-line invoice: 1000 at 18% GST.
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            input: CreateInvoiceInput {
                customer_id,
                date: Some(mid_fiscal_year()),
                lines: vec![line(dec!(1000), dec!(18))],
                prices_include_gst: None,
                manual_number: None,
                issue: true,
                idempotency_key: None,
                created_by: None,
            },
        }
    }

    pub fn draft(mut self) -> Self {
        self.input.issue = false;
        self
    }

    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.input.date = Some(date);
        self
    }

    pub fn lines(mut self, lines: Vec<InvoiceLineInput>) -> Self {
        self.input.lines = lines;
        self
    }

    pub fn inclusive_pricing(mut self) -> Self {
        self.input.prices_include_gst = Some(true);
        self
    }

    pub fn manual_number(mut self, number: impl Into<String>) -> Self {
        self.input.manual_number = Some(number.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.input.idempotency_key = Some(key.into());
        self
    }

    pub fn build(self) -> CreateInvoiceInput {
        self.input
    }
}

pub struct PaymentInputBuilder {
    input: RecordInvoicePaymentInput,
}

impl PaymentInputBuilder {
    pub fn new(invoice_id: InvoiceId, amount: Decimal) -> Self {
        Self {
            input: RecordInvoicePaymentInput {
                invoice_id,
                amount,
                date: None,
                method: PaymentMethod::BankTransfer,
                reference: None,
                idempotency_key: None,
                created_by: None,
            },
        }
    }

    pub fn method(mut self, method: PaymentMethod) -> Self {
        self.input.method = method;
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.input.reference = Some(reference.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.input.idempotency_key = Some(key.into());
        self
    }

    pub fn build(self) -> RecordInvoicePaymentInput {
        self.input
    }
}

pub struct CreditNoteInputBuilder {
    input: CreateCreditNoteInput,
}

impl CreditNoteInputBuilder {
    pub fn new(customer_id: CustomerId, lines: Vec<InvoiceLineInput>) -> Self {
        Self {
            input: CreateCreditNoteInput {
                customer_id,
                invoice_id: None,
                reason: None,
                date: Some(mid_fiscal_year()),
                lines,
                prices_include_gst: None,
                idempotency_key: None,
                created_by: None,
            },
        }
    }

    pub fn against(mut self, invoice_id: InvoiceId) -> Self {
        self.input.invoice_id = Some(invoice_id);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.input.reason = Some(reason.into());
        self
    }

    pub fn build(self) -> CreateCreditNoteInput {
        self.input
    }
}
