//! Idempotency guard
//!
//! Opt-in per request: a `None` key never reports a duplicate. The
//! pre-check here handles the common retry; the unique constraint on
//! `(org, idempotency_key)` per document table is the backstop for the
//! race where two concurrent requests both pass it. Workflows catch that
//! specific conflict, re-query, and return the winner's identity.

use uuid::Uuid;

use core_kernel::{OrgId, StoreError};

use crate::store::BillingStore;

/// Document tables guarded by an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Invoice,
    Payment,
    CreditNote,
}

/// Identity of the document a duplicate request originally created.
#[derive(Debug, Clone)]
pub struct ExistingDocument {
    pub id: Uuid,
    pub number: Option<String>,
}

/// Looks up an earlier document created with the same `(org, key)`.
pub async fn check_idempotency<S>(
    tx: &mut S,
    kind: DocKind,
    org_id: OrgId,
    key: Option<&str>,
) -> Result<Option<ExistingDocument>, StoreError>
where
    S: BillingStore + ?Sized,
{
    let Some(key) = key else {
        return Ok(None);
    };

    let existing = match kind {
        DocKind::Invoice => tx
            .find_invoice_by_idempotency_key(org_id, key)
            .await?
            .map(|inv| ExistingDocument { id: *inv.id.as_uuid(), number: inv.invoice_number }),
        DocKind::Payment => tx
            .find_payment_by_idempotency_key(org_id, key)
            .await?
            .map(|p| ExistingDocument { id: *p.id.as_uuid(), number: Some(p.payment_number) }),
        DocKind::CreditNote => tx
            .find_credit_note_by_idempotency_key(org_id, key)
            .await?
            .map(|cn| ExistingDocument {
                id: *cn.id.as_uuid(),
                number: Some(cn.credit_note_number),
            }),
    };
    Ok(existing)
}
