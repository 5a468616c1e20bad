//! Customer advances

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{AdvanceId, CustomerId, OrgId, PaymentId};

/// Unapplied excess from a customer payment, held as a future credit.
///
/// Sits on the Customer Advances liability account until applied to an
/// invoice, at which point the application posts Dr Advances / Cr AR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advance {
    pub id: AdvanceId,
    pub org_id: OrgId,
    pub customer_id: CustomerId,
    /// Original banked amount
    pub amount: Decimal,
    /// Amount still available for application
    pub balance: Decimal,
    pub source_payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
}
