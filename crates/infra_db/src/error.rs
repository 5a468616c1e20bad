//! sqlx → store error mapping
//!
//! Every adapter failure is mapped into the shared [`StoreError`]
//! taxonomy before it leaves this crate. Unique violations (Postgres
//! 23505) become `Conflict` carrying the constraint name, which is what
//! the idempotency and series-creation backstops match on.

use core_kernel::StoreError;

pub(crate) fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Connection(err.to_string())
        }
        sqlx::Error::Io(e) => StoreError::Connection(e.to_string()),
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                StoreError::Conflict {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                    message: db_err.message().to_string(),
                }
            } else {
                StoreError::Internal { message: db_err.message().to_string(), source: None }
            }
        }
        other => StoreError::Internal { message: other.to_string(), source: Some(Box::new(other)) },
    }
}
