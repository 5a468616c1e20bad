//! Core Kernel - Foundational types for the GST accounting system
//!
//! This crate provides the building blocks used across all domain modules:
//! - Money arithmetic with precise decimal rounding
//! - Strongly-typed identifiers
//! - Fiscal calendar (Indian April–March convention) and clock port
//! - Injectable ID generation and domain-event logging ports
//! - The store error taxonomy shared by all persistence adapters

pub mod fiscal;
pub mod identifiers;
pub mod money;
pub mod ports;

pub use fiscal::{Clock, FiscalError, FiscalYear, FixedClock, SystemClock};
pub use identifiers::{
    AccountId, AdvanceId, AllocationId, CreditNoteId, CustomerId, ExpenseId, InvoiceId,
    JournalEntryId, JournalLineId, OrgId, PaymentId, UserId, VendorId,
};
pub use ports::{
    DomainEvent, DomainEventLogger, IdGenerator, MemoryEventLogger, NullEventLogger, RandomIds,
    SequentialIds, StoreError, TracingEventLogger, WorkflowEnv,
};
