//! Postgres infrastructure
//!
//! Adapters binding the domain store ports (`LedgerStore`, `SeriesStore`,
//! `BillingStore`) to Postgres via sqlx. The unit of work is [`PgTx`]:
//! open one per workflow call, pass it through, commit at the end.
//! Schema lives in `migrations/` and is applied with [`MIGRATOR`].

pub mod error;
pub mod pool;
pub mod tx;

pub use pool::{create_pool, create_pool_from_url, DatabaseConfig, DatabasePool};
pub use tx::PgTx;

/// Embedded migrations for `crates/infra_db/migrations`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
