//! Posting engine tests over the in-memory ledger transaction

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{
    money, FixedClock, MemoryEventLogger, OrgId, SequentialIds, StoreError, WorkflowEnv,
};
use domain_ledger::store::LedgerStore;
use domain_ledger::{
    codes, post, reverse, EntryStatus, GstChartOfAccounts, LedgerError, MemoryLedgerTx,
    PostingInput, PostingLine,
};

fn entry_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
}

struct Harness {
    org: OrgId,
    tx: MemoryLedgerTx,
    clock: FixedClock,
    ids: SequentialIds,
    events: MemoryEventLogger,
}

impl Harness {
    fn new() -> Self {
        let org = OrgId::new();
        Self {
            org,
            tx: MemoryLedgerTx::with_accounts(GstChartOfAccounts::standard(org)),
            clock: FixedClock::on_ist_date(entry_date()),
            ids: SequentialIds::default(),
            events: MemoryEventLogger::new(),
        }
    }

}

fn sale_input(subtotal: Decimal, tax: Decimal) -> PostingInput {
    PostingInput {
        date: entry_date(),
        narration: "Invoice issued".to_string(),
        reference: None,
        lines: vec![
            PostingLine::debit(codes::ACCOUNTS_RECEIVABLE, subtotal + tax),
            PostingLine::credit(codes::SALES, subtotal),
            PostingLine::credit(codes::OUTPUT_CGST, money::divide(tax, dec!(2))),
            PostingLine::credit(codes::OUTPUT_SGST, money::subtract(tax, money::divide(tax, dec!(2)))),
        ],
        created_by: None,
    }
}

async fn balance_of(tx: &mut MemoryLedgerTx, org: OrgId, code: &str) -> Decimal {
    let account = tx.find_account_by_code(org, code).await.unwrap().unwrap();
    account.balance
}

#[tokio::test]
async fn test_post_updates_balances_and_numbers_entry() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let result = post(&mut h.tx, &env, h.org, sale_input(dec!(1000), dec!(180)))
        .await
        .unwrap();

    assert_eq!(result.entry_number, "JRN-2024-25-0001");
    assert_eq!(result.lines.len(), 4);

    assert_eq!(balance_of(&mut h.tx, h.org, codes::ACCOUNTS_RECEIVABLE).await, dec!(1180));
    assert_eq!(balance_of(&mut h.tx, h.org, codes::SALES).await, dec!(-1000));
    assert_eq!(balance_of(&mut h.tx, h.org, codes::OUTPUT_CGST).await, dec!(-90));
    assert_eq!(balance_of(&mut h.tx, h.org, codes::OUTPUT_SGST).await, dec!(-90));

    let entry = h
        .tx
        .get_journal_entry(h.org, result.journal_entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, EntryStatus::Posted);
    assert_eq!(entry.total_debit, entry.total_credit);
    assert_eq!(entry.total_debit, dec!(1180.00));

    assert!(h.events.actions().contains(&"journal_entry.posted".to_string()));
}

#[tokio::test]
async fn test_entry_numbers_are_sequential() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let first = post(&mut h.tx, &env, h.org, sale_input(dec!(100), dec!(18)))
        .await
        .unwrap();
    let second = post(&mut h.tx, &env, h.org, sale_input(dec!(200), dec!(36)))
        .await
        .unwrap();

    assert_eq!(first.entry_number, "JRN-2024-25-0001");
    assert_eq!(second.entry_number, "JRN-2024-25-0002");
}

#[tokio::test]
async fn test_unknown_account_code_fails_and_persists_nothing() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = PostingInput {
        date: entry_date(),
        narration: "bad".to_string(),
        reference: None,
        lines: vec![
            PostingLine::debit("9999", dec!(100)),
            PostingLine::credit(codes::SALES, dec!(100)),
        ],
        created_by: None,
    };
    let err = post(&mut h.tx, &env, h.org, input).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound { ref code } if code == "9999"));

    // No balance moved, no number burned.
    assert_eq!(balance_of(&mut h.tx, h.org, codes::SALES).await, Decimal::ZERO);
    let next = post(&mut h.tx, &env, h.org, sale_input(dec!(100), dec!(18)))
        .await
        .unwrap();
    assert_eq!(next.entry_number, "JRN-2024-25-0001");
}

#[tokio::test]
async fn test_minimum_lines_enforced() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = PostingInput {
        date: entry_date(),
        narration: "single-legged".to_string(),
        reference: None,
        lines: vec![PostingLine::debit(codes::CASH, dec!(100))],
        created_by: None,
    };
    let err = post(&mut h.tx, &env, h.org, input).await.unwrap_err();
    assert!(matches!(err, LedgerError::EntryMinLines { count: 1 }));
    assert!(err.is_invariant_violation());
}

#[tokio::test]
async fn test_unbalanced_entry_rejected() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let input = PostingInput {
        date: entry_date(),
        narration: "off by a paisa".to_string(),
        reference: None,
        lines: vec![
            PostingLine::debit(codes::CASH, dec!(100.00)),
            PostingLine::credit(codes::SALES, dec!(100.01)),
        ],
        created_by: None,
    };
    let err = post(&mut h.tx, &env, h.org, input).await.unwrap_err();
    assert!(matches!(err, LedgerError::EntryUnbalanced { .. }));
    assert_eq!(balance_of(&mut h.tx, h.org, codes::CASH).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_reversal_mirrors_lines_and_zeroes_balances() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let posted = post(&mut h.tx, &env, h.org, sale_input(dec!(1000), dec!(180)))
        .await
        .unwrap();
    let reversal = reverse(&mut h.tx, &env, h.org, posted.journal_entry_id, entry_date(), None)
        .await
        .unwrap();

    // Mirror symmetry: each reversal line swaps (debit, credit).
    assert_eq!(reversal.lines.len(), posted.lines.len());
    for (orig, rev) in posted.lines.iter().zip(reversal.lines.iter()) {
        assert_eq!(orig.account_id, rev.account_id);
        assert_eq!(orig.debit, rev.credit);
        assert_eq!(orig.credit, rev.debit);
    }

    // Net effect on every touched account is exactly zero.
    for code in [codes::ACCOUNTS_RECEIVABLE, codes::SALES, codes::OUTPUT_CGST, codes::OUTPUT_SGST] {
        assert_eq!(balance_of(&mut h.tx, h.org, code).await, Decimal::ZERO);
    }

    let original = h
        .tx
        .get_journal_entry(h.org, posted.journal_entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original.status, EntryStatus::Reversed);
    assert_eq!(
        h.tx.find_reversal_of(h.org, posted.journal_entry_id)
            .await
            .unwrap(),
        Some(reversal.journal_entry_id)
    );
    // The reversal itself is a normal posted entry with its own number.
    assert_eq!(reversal.entry_number, "JRN-2024-25-0002");
}

#[tokio::test]
async fn test_reverse_is_one_shot() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let posted = post(&mut h.tx, &env, h.org, sale_input(dec!(500), dec!(90)))
        .await
        .unwrap();
    reverse(&mut h.tx, &env, h.org, posted.journal_entry_id, entry_date(), None)
        .await
        .unwrap();

    let err = reverse(&mut h.tx, &env, h.org, posted.journal_entry_id, entry_date(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyReversed(id) if id == posted.journal_entry_id));
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_reverse_missing_entry_is_not_found() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let missing = core_kernel::JournalEntryId::new();
    let err = reverse(&mut h.tx, &env, h.org, missing, entry_date(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::EntryNotFound(id) if id == missing));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_entries_are_org_scoped() {
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let posted = post(&mut h.tx, &env, h.org, sale_input(dec!(100), dec!(18)))
        .await
        .unwrap();

    let other_org = OrgId::new();
    let err = reverse(&mut h.tx, &env, other_org, posted.journal_entry_id, entry_date(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::EntryNotFound(_)));
}

#[tokio::test]
async fn test_duplicate_reversal_relation_is_conflict() {
    // The relation itself rejects a second reversal for the same
    // original, independent of the status check above it.
    let mut h = Harness::new();
    let env = WorkflowEnv::new(&h.clock, &h.ids, &h.events);

    let posted = post(&mut h.tx, &env, h.org, sale_input(dec!(100), dec!(18)))
        .await
        .unwrap();
    let reversal = reverse(&mut h.tx, &env, h.org, posted.journal_entry_id, entry_date(), None)
        .await
        .unwrap();

    let err = h
        .tx
        .record_reversal(h.org, posted.journal_entry_id, reversal.journal_entry_id)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}
