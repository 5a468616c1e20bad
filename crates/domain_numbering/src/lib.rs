//! Numbering Domain - Document number series
//!
//! Atomic, per `(organization, module, fiscal year)` monotonic sequence
//! allocation producing human-readable document numbers such as
//! `INV-2024-25-0042`. Allocation runs inside the caller's transaction
//! so aborted document creation never burns a number.

pub mod error;
pub mod series;
pub mod store;

pub use error::SeriesError;
pub use series::{bump_if_higher, format_number, next_number, peek_next_number, DocModule, NumberSeries};
pub use store::{MemorySeriesStore, SeriesStore, SERIES_KEY_CONSTRAINT};
