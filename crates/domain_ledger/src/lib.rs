//! Ledger Domain - Double-entry bookkeeping engine
//!
//! This crate implements the chart of accounts, the immutable journal,
//! the invariant validator, and the posting engine that together keep
//! money provably balanced:
//!
//! - every journal entry balances exactly (debits = credits, no epsilon)
//! - every line is strictly a debit or a credit, never both or neither
//! - posted entries are never edited; the only undo is a mirror-image
//!   reversal entry, so the audit trail is complete and replayable

pub mod account;
pub mod error;
pub mod journal;
pub mod posting;
pub mod store;
pub mod validation;

pub use account::{codes, Account, AccountType, GstChartOfAccounts};
pub use error::LedgerError;
pub use journal::{DocumentRef, EntryStatus, JournalEntry, JournalLine, PartyRef};
pub use posting::{post, reverse, PostingInput, PostingLine, PostingResult};
pub use store::{LedgerStore, MemoryLedgerStore, MemoryLedgerTx};
pub use validation::{validate_new_entry, LineCandidate};
