//! Shared test infrastructure
//!
//! - `fixtures`: deterministic organizations, customers, and a seeded
//!   in-memory transaction
//! - `builders`: workflow-input builders with sensible defaults
//! - `env`: the fixed-clock/sequential-id/captured-events bundle
//! - `generators`: proptest strategies for money and GST rates

pub mod builders;
pub mod env;
pub mod fixtures;
pub mod generators;

pub use builders::*;
pub use env::*;
pub use fixtures::*;
pub use generators::*;
