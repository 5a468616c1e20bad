//! GST breakdown calculation
//!
//! Computes per-line and per-document GST amounts. Intra-state supplies
//! split tax into equal CGST and SGST halves (the odd paisa goes to
//! CGST so the halves always sum exactly); inter-state supplies carry a
//! single IGST amount. Prices may be tax-inclusive, in which case the
//! taxable amount is back-calculated from the gross.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::money;

use crate::error::TaxError;

const HUNDRED: Decimal = dec!(100);

/// One taxable line: quantity, unit rate, and GST percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    pub quantity: Decimal,
    pub rate: Decimal,
    pub gst_rate: Decimal,
}

/// Document-level context the breakdown depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxContext {
    /// Supply crosses state lines: all tax is IGST.
    pub is_inter_state: bool,
    /// Line rates are GST-inclusive.
    pub prices_include_gst: bool,
}

/// GST breakdown for a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTaxBreakdown {
    /// quantity × rate, rounded
    pub amount: Decimal,
    /// Tax base (equals `amount` for exclusive pricing)
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    /// Line total including tax
    pub total: Decimal,
}

/// Component-wise sum of line breakdowns for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTaxTotals {
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total_tax: Decimal,
    pub total: Decimal,
}

fn validate_line(line: &TaxLine) -> Result<(), TaxError> {
    if line.quantity.is_sign_negative() {
        return Err(TaxError::NegativeInput { field: "quantity", value: line.quantity });
    }
    if line.rate.is_sign_negative() {
        return Err(TaxError::NegativeInput { field: "rate", value: line.rate });
    }
    if line.gst_rate.is_sign_negative() || line.gst_rate > HUNDRED {
        return Err(TaxError::GstRateOutOfRange(line.gst_rate));
    }
    Ok(())
}

/// Computes the GST breakdown for one line.
pub fn calculate_line_tax(line: &TaxLine, ctx: &TaxContext) -> Result<LineTaxBreakdown, TaxError> {
    validate_line(line)?;

    let amount = money::multiply(line.quantity, line.rate);

    let (taxable_amount, tax_amount, total) = if ctx.prices_include_gst && line.gst_rate > Decimal::ZERO {
        // Back-calculate the base from the tax-inclusive gross.
        let divisor = Decimal::ONE + line.gst_rate / HUNDRED;
        let taxable = money::divide(amount, divisor);
        (taxable, money::subtract(amount, taxable), amount)
    } else {
        let tax = money::round2(amount * line.gst_rate / HUNDRED);
        (amount, tax, money::add(&[amount, tax]))
    };

    let (cgst, sgst, igst) = if ctx.is_inter_state {
        (Decimal::ZERO, Decimal::ZERO, tax_amount)
    } else {
        // First half rounds; the remainder keeps the two halves summing
        // exactly to tax_amount even on an odd paisa.
        let half = money::divide(tax_amount, dec!(2));
        (half, money::subtract(tax_amount, half), Decimal::ZERO)
    };

    Ok(LineTaxBreakdown {
        amount,
        taxable_amount,
        tax_amount,
        cgst,
        sgst,
        igst,
        total,
    })
}

/// Sums line breakdowns component-wise into document totals.
pub fn calculate_invoice_tax_totals(
    lines: &[TaxLine],
    ctx: &TaxContext,
) -> Result<InvoiceTaxTotals, TaxError> {
    let breakdowns = lines
        .iter()
        .map(|line| calculate_line_tax(line, ctx))
        .collect::<Result<Vec<_>, _>>()?;

    let subtotal = money::add(&breakdowns.iter().map(|b| b.taxable_amount).collect::<Vec<_>>());
    let cgst = money::add(&breakdowns.iter().map(|b| b.cgst).collect::<Vec<_>>());
    let sgst = money::add(&breakdowns.iter().map(|b| b.sgst).collect::<Vec<_>>());
    let igst = money::add(&breakdowns.iter().map(|b| b.igst).collect::<Vec<_>>());
    let total_tax = money::add(&[cgst, sgst, igst]);
    let total = if ctx.prices_include_gst {
        // Inclusive pricing: line amounts already carry the tax.
        money::add(&breakdowns.iter().map(|b| b.total).collect::<Vec<_>>())
    } else {
        money::add(&[subtotal, total_tax])
    };

    Ok(InvoiceTaxTotals { subtotal, cgst, sgst, igst, total_tax, total })
}

/// Resolves the effective pricing mode for a document.
///
/// An explicit document-level setting wins (true or false); otherwise
/// the organization default applies; absent both, prices are exclusive.
pub fn resolve_prices_include_gst(document_level: Option<bool>, org_default: Option<bool>) -> bool {
    document_level.or(org_default).unwrap_or(false)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn gst_rates() -> impl Strategy<Value = Decimal> {
        prop_oneof![
            Just(dec!(0)),
            Just(dec!(5)),
            Just(dec!(12)),
            Just(dec!(18)),
            Just(dec!(28)),
        ]
    }

    proptest! {
        #[test]
        fn intra_state_halves_always_sum_exactly(
            paise in 1i64..100_000_000i64,
            gst in gst_rates()
        ) {
            let line = TaxLine {
                quantity: Decimal::ONE,
                rate: Decimal::new(paise, 2),
                gst_rate: gst,
            };
            let ctx = TaxContext { is_inter_state: false, prices_include_gst: false };
            let b = calculate_line_tax(&line, &ctx).unwrap();
            prop_assert_eq!(b.cgst + b.sgst, b.tax_amount);
            prop_assert!((b.cgst - b.sgst).abs() <= dec!(0.01));
        }

        #[test]
        fn inclusive_base_plus_tax_recovers_gross(
            paise in 1i64..100_000_000i64,
            gst in gst_rates()
        ) {
            let line = TaxLine {
                quantity: Decimal::ONE,
                rate: Decimal::new(paise, 2),
                gst_rate: gst,
            };
            let ctx = TaxContext { is_inter_state: false, prices_include_gst: true };
            let b = calculate_line_tax(&line, &ctx).unwrap();
            prop_assert_eq!(b.taxable_amount + b.tax_amount, b.amount);
            prop_assert_eq!(b.total, b.amount);
        }
    }
}
