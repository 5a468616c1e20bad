//! The posting engine
//!
//! Builds, persists, and reverses balanced journal entries. Everything
//! runs inside the caller's transaction: account resolution, invariant
//! validation, entry numbering, row insertion, and running-balance
//! updates either all commit or all roll back.
//!
//! Reversal is the only mechanism for undoing a posted financial
//! effect. It creates a mirror-image companion entry through the same
//! posting path (independently validated and numbered) and records the
//! original -> reversal relation; history is never edited in place.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::instrument;

use core_kernel::{
    money, DomainEvent, FiscalYear, JournalEntryId, JournalLineId, OrgId, UserId, WorkflowEnv,
};
use domain_numbering::{next_number, DocModule, SeriesStore};

use crate::account::Account;
use crate::error::LedgerError;
use crate::journal::{DocumentRef, EntryStatus, JournalEntry, JournalLine, PartyRef};
use crate::store::LedgerStore;
use crate::validation::{validate_new_entry, LineCandidate};

/// One proposed leg, addressed by account code.
#[derive(Debug, Clone)]
pub struct PostingLine {
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub party: Option<PartyRef>,
}

impl PostingLine {
    pub fn debit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: Decimal::ZERO,
            party: None,
        }
    }

    pub fn credit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            debit: Decimal::ZERO,
            credit: amount,
            party: None,
        }
    }

    pub fn for_party(mut self, party: PartyRef) -> Self {
        self.party = Some(party);
        self
    }
}

/// A proposed journal entry.
#[derive(Debug, Clone)]
pub struct PostingInput {
    pub date: NaiveDate,
    pub narration: String,
    pub reference: Option<DocumentRef>,
    pub lines: Vec<PostingLine>,
    pub created_by: Option<UserId>,
}

/// Outcome of a successful post or reverse.
#[derive(Debug, Clone)]
pub struct PostingResult {
    pub journal_entry_id: JournalEntryId,
    pub entry_number: String,
    pub lines: Vec<JournalLine>,
}

/// A leg whose account code has been resolved to an account row.
#[derive(Debug, Clone)]
struct ResolvedLine {
    account: Account,
    debit: Decimal,
    credit: Decimal,
    party: Option<PartyRef>,
}

/// Posts a balanced journal entry.
///
/// Fails with `AccountNotFound` if any line's code is unmapped for the
/// org, or with a validation error kind if the line set violates the
/// double-entry invariants. Callers choose correct debit/credit sides
/// per account type; the engine applies `debit - credit` to each
/// account's debit-positive running balance.
#[instrument(skip(tx, env, input), fields(org_id = %org_id, lines = input.lines.len()))]
pub async fn post<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    input: PostingInput,
) -> Result<PostingResult, LedgerError>
where
    S: LedgerStore + SeriesStore + ?Sized,
{
    let mut resolved = Vec::with_capacity(input.lines.len());
    for line in &input.lines {
        let account = tx
            .find_account_by_code(org_id, &line.account_code)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound { code: line.account_code.clone() })?;
        resolved.push(ResolvedLine {
            account,
            debit: money::round2(line.debit),
            credit: money::round2(line.credit),
            party: line.party,
        });
    }

    post_resolved(
        tx,
        env,
        org_id,
        input.date,
        input.narration,
        input.reference,
        resolved,
        input.created_by,
    )
    .await
}

/// Reverses a posted entry by creating its mirror image.
///
/// One-shot: a second reversal of the same entry fails with
/// `AlreadyReversed`. The reversal entry swaps debit and credit on
/// every line, touching the same accounts, so the net balance effect of
/// the pair is exactly zero.
#[instrument(skip(tx, env), fields(org_id = %org_id, entry = %journal_entry_id))]
pub async fn reverse<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    journal_entry_id: JournalEntryId,
    reversal_date: NaiveDate,
    reversed_by: Option<UserId>,
) -> Result<PostingResult, LedgerError>
where
    S: LedgerStore + SeriesStore + ?Sized,
{
    let original = tx
        .get_journal_entry(org_id, journal_entry_id)
        .await?
        .ok_or(LedgerError::EntryNotFound(journal_entry_id))?;
    if original.status == EntryStatus::Reversed {
        return Err(LedgerError::AlreadyReversed(journal_entry_id));
    }

    let original_lines = tx.get_journal_lines(journal_entry_id).await?;
    let mut resolved = Vec::with_capacity(original_lines.len());
    for line in &original_lines {
        let account = tx.get_account(org_id, line.account_id).await?;
        resolved.push(ResolvedLine {
            account,
            debit: line.credit,
            credit: line.debit,
            party: line.party,
        });
    }

    let result = post_resolved(
        tx,
        env,
        org_id,
        reversal_date,
        format!("Reversal of {}", original.entry_number),
        Some(DocumentRef::new("journal_entry", *journal_entry_id.as_uuid())),
        resolved,
        reversed_by,
    )
    .await?;

    tx.record_reversal(org_id, journal_entry_id, result.journal_entry_id)
        .await?;

    env.events.record(
        DomainEvent::new(org_id, "journal_entry.reversed", "journal_entry", journal_entry_id)
            .with_detail(serde_json::json!({
                "reversal_entry_id": result.journal_entry_id,
                "reversal_entry_number": result.entry_number,
            })),
    );

    Ok(result)
}

#[allow(clippy::too_many_arguments)]
async fn post_resolved<S>(
    tx: &mut S,
    env: &WorkflowEnv<'_>,
    org_id: OrgId,
    date: NaiveDate,
    narration: String,
    reference: Option<DocumentRef>,
    lines: Vec<ResolvedLine>,
    created_by: Option<UserId>,
) -> Result<PostingResult, LedgerError>
where
    S: LedgerStore + SeriesStore + ?Sized,
{
    let candidates: Vec<LineCandidate> = lines
        .iter()
        .map(|l| LineCandidate { debit: l.debit, credit: l.credit })
        .collect();
    validate_new_entry(&candidates)?;

    let entry_number = next_number(
        tx,
        env.clock,
        org_id,
        DocModule::Journal,
        Some(FiscalYear::from_date(date)),
    )
    .await?;

    let entry_id = JournalEntryId::from_uuid(env.ids.next());
    let total_debit = money::add(&lines.iter().map(|l| l.debit).collect::<Vec<_>>());
    let total_credit = money::add(&lines.iter().map(|l| l.credit).collect::<Vec<_>>());

    let journal_lines: Vec<JournalLine> = lines
        .iter()
        .map(|l| JournalLine {
            id: JournalLineId::from_uuid(env.ids.next()),
            journal_entry_id: entry_id,
            account_id: l.account.id,
            debit: l.debit,
            credit: l.credit,
            party: l.party,
        })
        .collect();

    let entry = JournalEntry {
        id: entry_id,
        org_id,
        entry_number: entry_number.clone(),
        date,
        narration,
        reference,
        total_debit,
        total_credit,
        status: EntryStatus::Posted,
        created_by,
        created_at: env.clock.now(),
    };

    tx.insert_journal_entry(entry, journal_lines.clone()).await?;
    for line in &journal_lines {
        tx.apply_balance_delta(line.account_id, line.balance_delta())
            .await?;
    }

    env.events.record(
        DomainEvent::new(org_id, "journal_entry.posted", "journal_entry", entry_id)
            .with_detail(serde_json::json!({
                "entry_number": entry_number,
                "total_debit": total_debit,
                "total_credit": total_credit,
            })),
    );

    Ok(PostingResult { journal_entry_id: entry_id, entry_number, lines: journal_lines })
}
