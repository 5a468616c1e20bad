//! Ledger store port and in-memory adapter
//!
//! All mutation of accounts and journal rows goes through this port,
//! scoped to the caller's transaction. Balance changes are expressed as
//! deltas so adapters can apply them atomically (`balance = balance +
//! delta`) rather than read-modify-write in application code.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use core_kernel::{AccountId, FiscalYear, JournalEntryId, OrgId, StoreError};
use domain_numbering::{DocModule, MemorySeriesStore, NumberSeries, SeriesStore};

use crate::account::Account;
use crate::journal::{EntryStatus, JournalEntry, JournalLine};

#[async_trait]
pub trait LedgerStore: Send {
    async fn find_account_by_code(
        &mut self,
        org_id: OrgId,
        code: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn get_account(&mut self, org_id: OrgId, id: AccountId) -> Result<Account, StoreError>;

    async fn insert_account(&mut self, account: Account) -> Result<(), StoreError>;

    /// Atomically adds `delta` to the account's running balance.
    async fn apply_balance_delta(
        &mut self,
        account_id: AccountId,
        delta: Decimal,
    ) -> Result<(), StoreError>;

    /// Inserts an entry and all of its lines as one write.
    async fn insert_journal_entry(
        &mut self,
        entry: JournalEntry,
        lines: Vec<JournalLine>,
    ) -> Result<(), StoreError>;

    async fn get_journal_entry(
        &mut self,
        org_id: OrgId,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, StoreError>;

    async fn get_journal_lines(
        &mut self,
        entry_id: JournalEntryId,
    ) -> Result<Vec<JournalLine>, StoreError>;

    /// Flips the original entry to `Reversed` and appends the
    /// `original -> reversal` relation. Fails with a conflict if a
    /// reversal is already recorded for the original.
    async fn record_reversal(
        &mut self,
        org_id: OrgId,
        original: JournalEntryId,
        reversal: JournalEntryId,
    ) -> Result<(), StoreError>;

    /// Looks up the reversal entry recorded for an original, if any.
    async fn find_reversal_of(
        &mut self,
        org_id: OrgId,
        original: JournalEntryId,
    ) -> Result<Option<JournalEntryId>, StoreError>;
}

/// In-memory adapter, used by tests and the in-process transaction.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    accounts: HashMap<AccountId, Account>,
    entries: HashMap<JournalEntryId, JournalEntry>,
    lines: HashMap<JournalEntryId, Vec<JournalLine>>,
    reversals: HashMap<JournalEntryId, JournalEntryId>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        let mut store = Self::default();
        for account in accounts {
            store.accounts.insert(account.id, account);
        }
        store
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_account_by_code(
        &mut self,
        org_id: OrgId,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .values()
            .find(|a| a.org_id == org_id && a.code == code)
            .cloned())
    }

    async fn get_account(&mut self, org_id: OrgId, id: AccountId) -> Result<Account, StoreError> {
        self.accounts
            .get(&id)
            .filter(|a| a.org_id == org_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Account", id))
    }

    async fn insert_account(&mut self, account: Account) -> Result<(), StoreError> {
        if self
            .accounts
            .values()
            .any(|a| a.org_id == account.org_id && a.code == account.code)
        {
            return Err(StoreError::conflict(
                "accounts_org_code",
                format!("account code {} already exists", account.code),
            ));
        }
        self.accounts.insert(account.id, account);
        Ok(())
    }

    async fn apply_balance_delta(
        &mut self,
        account_id: AccountId,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::not_found("Account", account_id))?;
        account.balance += delta;
        Ok(())
    }

    async fn insert_journal_entry(
        &mut self,
        entry: JournalEntry,
        lines: Vec<JournalLine>,
    ) -> Result<(), StoreError> {
        if self.entries.contains_key(&entry.id) {
            return Err(StoreError::conflict(
                "journal_entries_pkey",
                format!("journal entry {} already exists", entry.id),
            ));
        }
        self.lines.insert(entry.id, lines);
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    async fn get_journal_entry(
        &mut self,
        org_id: OrgId,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, StoreError> {
        Ok(self
            .entries
            .get(&id)
            .filter(|e| e.org_id == org_id)
            .cloned())
    }

    async fn get_journal_lines(
        &mut self,
        entry_id: JournalEntryId,
    ) -> Result<Vec<JournalLine>, StoreError> {
        Ok(self.lines.get(&entry_id).cloned().unwrap_or_default())
    }

    async fn record_reversal(
        &mut self,
        org_id: OrgId,
        original: JournalEntryId,
        reversal: JournalEntryId,
    ) -> Result<(), StoreError> {
        if self.reversals.contains_key(&original) {
            return Err(StoreError::conflict(
                "journal_entry_reversals_original",
                format!("reversal already recorded for {original}"),
            ));
        }
        let entry = self
            .entries
            .get_mut(&original)
            .filter(|e| e.org_id == org_id)
            .ok_or_else(|| StoreError::not_found("JournalEntry", original))?;
        entry.status = EntryStatus::Reversed;
        self.reversals.insert(original, reversal);
        Ok(())
    }

    async fn find_reversal_of(
        &mut self,
        _org_id: OrgId,
        original: JournalEntryId,
    ) -> Result<Option<JournalEntryId>, StoreError> {
        Ok(self.reversals.get(&original).copied())
    }
}

/// In-memory transaction combining ledger and number-series state.
///
/// The posting engine needs both ports on one transaction handle; this
/// is the in-process equivalent of a database transaction for tests and
/// embedded use.
#[derive(Debug, Default)]
pub struct MemoryLedgerTx {
    pub ledger: MemoryLedgerStore,
    pub series: MemorySeriesStore,
}

impl MemoryLedgerTx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            ledger: MemoryLedgerStore::with_accounts(accounts),
            series: MemorySeriesStore::new(),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerTx {
    async fn find_account_by_code(
        &mut self,
        org_id: OrgId,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.ledger.find_account_by_code(org_id, code).await
    }

    async fn get_account(&mut self, org_id: OrgId, id: AccountId) -> Result<Account, StoreError> {
        self.ledger.get_account(org_id, id).await
    }

    async fn insert_account(&mut self, account: Account) -> Result<(), StoreError> {
        self.ledger.insert_account(account).await
    }

    async fn apply_balance_delta(
        &mut self,
        account_id: AccountId,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        self.ledger.apply_balance_delta(account_id, delta).await
    }

    async fn insert_journal_entry(
        &mut self,
        entry: JournalEntry,
        lines: Vec<JournalLine>,
    ) -> Result<(), StoreError> {
        self.ledger.insert_journal_entry(entry, lines).await
    }

    async fn get_journal_entry(
        &mut self,
        org_id: OrgId,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, StoreError> {
        self.ledger.get_journal_entry(org_id, id).await
    }

    async fn get_journal_lines(
        &mut self,
        entry_id: JournalEntryId,
    ) -> Result<Vec<JournalLine>, StoreError> {
        self.ledger.get_journal_lines(entry_id).await
    }

    async fn record_reversal(
        &mut self,
        org_id: OrgId,
        original: JournalEntryId,
        reversal: JournalEntryId,
    ) -> Result<(), StoreError> {
        self.ledger.record_reversal(org_id, original, reversal).await
    }

    async fn find_reversal_of(
        &mut self,
        org_id: OrgId,
        original: JournalEntryId,
    ) -> Result<Option<JournalEntryId>, StoreError> {
        self.ledger.find_reversal_of(org_id, original).await
    }
}

#[async_trait]
impl SeriesStore for MemoryLedgerTx {
    async fn find_series(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
    ) -> Result<Option<NumberSeries>, StoreError> {
        self.series.find_series(org_id, module, fiscal_year).await
    }

    async fn insert_series(&mut self, series: NumberSeries) -> Result<(), StoreError> {
        self.series.insert_series(series).await
    }

    async fn set_current_number(
        &mut self,
        org_id: OrgId,
        module: DocModule,
        fiscal_year: FiscalYear,
        current_number: i64,
    ) -> Result<(), StoreError> {
        self.series
            .set_current_number(org_id, module, fiscal_year, current_number)
            .await
    }
}
