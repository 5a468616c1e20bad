//! Ports shared by every domain crate
//!
//! Each domain defines its own store trait for persistence; the common
//! pieces live here: the error taxonomy all store adapters map into, and
//! the injectable clock/ID/audit dependencies that keep workflow code
//! deterministic under test.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::identifiers::OrgId;

/// Error type every store adapter maps its failures into.
///
/// Domain code matches on these variants (never on message text) to
/// decide recovery paths; in particular [`StoreError::is_unique_violation`]
/// drives the idempotency-race backstop.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist
    #[error("Not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint rejected the write
    #[error("Conflict on {constraint}: {message}")]
    Conflict { constraint: String, message: String },

    /// The underlying store is unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Any other adapter failure
    #[error("Store error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound { entity, id: id.to_string() }
    }

    pub fn conflict(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Conflict { constraint: constraint.into(), message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal { message: message.into(), source: None }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Unique violation on the named constraint specifically.
    pub fn violates(&self, constraint_name: &str) -> bool {
        matches!(self, StoreError::Conflict { constraint, .. } if constraint == constraint_name)
    }
}

/// ID generation port, injected so tests can allocate predictable IDs.
pub trait IdGenerator: Send + Sync {
    fn next(&self) -> Uuid;
}

/// Random v4 UUIDs, the production generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic counter-based UUIDs for tests.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn next(&self) -> Uuid {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Uuid::from_u128(n as u128)
    }
}

/// Bundle of injected runtime dependencies passed into workflows.
///
/// Keeps the clock, ID generation, and audit logging explicit so any
/// workflow can run deterministically under test.
#[derive(Clone, Copy)]
pub struct WorkflowEnv<'a> {
    pub clock: &'a dyn crate::fiscal::Clock,
    pub ids: &'a dyn IdGenerator,
    pub events: &'a dyn DomainEventLogger,
}

impl<'a> WorkflowEnv<'a> {
    pub fn new(
        clock: &'a dyn crate::fiscal::Clock,
        ids: &'a dyn IdGenerator,
        events: &'a dyn DomainEventLogger,
    ) -> Self {
        Self { clock, ids, events }
    }
}

/// A domain activity record, emitted after successful state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub org_id: OrgId,
    /// Dotted action name, e.g. `invoice.issued`
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub detail: serde_json::Value,
}

impl DomainEvent {
    pub fn new(
        org_id: OrgId,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl std::fmt::Display,
    ) -> Self {
        Self {
            org_id,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Audit/activity logging port.
///
/// Fire-and-forget: implementations must not fail the calling workflow,
/// and correctness never depends on an event being recorded.
pub trait DomainEventLogger: Send + Sync {
    fn record(&self, event: DomainEvent);
}

/// Default logger, emitting events to the `tracing` pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLogger;

impl DomainEventLogger for TracingEventLogger {
    fn record(&self, event: DomainEvent) {
        tracing::info!(
            org_id = %event.org_id,
            action = %event.action,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            detail = %event.detail,
            "domain event"
        );
    }
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventLogger;

impl DomainEventLogger for NullEventLogger {
    fn record(&self, _event: DomainEvent) {}
}

/// Captures events for test assertions.
#[derive(Debug, Default)]
pub struct MemoryEventLogger {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("event log poisoned").clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.action).collect()
    }
}

impl DomainEventLogger for MemoryEventLogger {
    fn record(&self, event: DomainEvent) {
        self.events.lock().expect("event log poisoned").push(event);
    }
}
