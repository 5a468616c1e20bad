//! Proptest strategies for money and tax inputs

use proptest::prelude::*;
use rust_decimal::Decimal;

/// Positive amounts in whole paise, up to 1 crore.
pub fn money_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000_000).prop_map(|paise| Decimal::new(paise, 2))
}

/// Amounts that may be zero or negative, for validation paths.
pub fn signed_amount() -> impl Strategy<Value = Decimal> {
    (-1_000_000_000i64..=1_000_000_000).prop_map(|paise| Decimal::new(paise, 2))
}

/// The GST slab rates in force.
pub fn gst_rate() -> impl Strategy<Value = Decimal> {
    prop::sample::select(vec![
        Decimal::ZERO,
        Decimal::new(5, 0),
        Decimal::new(12, 0),
        Decimal::new(18, 0),
        Decimal::new(28, 0),
    ])
}

/// Small positive quantities with up to three decimal places.
pub fn quantity() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000).prop_map(|milli| Decimal::new(milli, 3))
}
