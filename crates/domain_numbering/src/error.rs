//! Numbering domain errors

use thiserror::Error;

use core_kernel::StoreError;

/// Errors that can occur while allocating document numbers
#[derive(Debug, Error)]
pub enum SeriesError {
    /// Unknown document module name
    #[error("Unknown document module: {0}")]
    UnknownModule(String),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}
