//! Tax Domain - GST breakdown calculator
//!
//! Pure calculation of Indian GST for invoice and credit-note lines:
//! CGST/SGST for intra-state supplies, IGST for inter-state, with
//! support for tax-inclusive pricing. All arithmetic routes through the
//! kernel's decimal money helpers.

pub mod error;
pub mod gst;

pub use error::TaxError;
pub use gst::{
    calculate_invoice_tax_totals, calculate_line_tax, resolve_prices_include_gst,
    InvoiceTaxTotals, LineTaxBreakdown, TaxContext, TaxLine,
};
