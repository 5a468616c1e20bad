//! Document number series
//!
//! Every financial document carries a human-readable number of the form
//! `{prefix}-{fiscal year}-{sequence}` (e.g. `INV-2024-25-0042`),
//! allocated from a per `(organization, module, fiscal year)` counter.
//! The counter is read-or-created and incremented inside the caller's
//! transaction, so aborting the document creation also rolls back the
//! increment. Numbers are monotonic and non-duplicating within a key;
//! they are not guaranteed gap-free across commits.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use core_kernel::{Clock, FiscalYear, OrgId};

use crate::error::SeriesError;
use crate::store::SeriesStore;

/// Document modules with independent number series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocModule {
    Invoice,
    Payment,
    CreditNote,
    Expense,
    Journal,
}

impl DocModule {
    /// Prefix used in formatted document numbers.
    pub fn prefix(&self) -> &'static str {
        match self {
            DocModule::Invoice => "INV",
            DocModule::Payment => "PAY",
            DocModule::CreditNote => "CN",
            DocModule::Expense => "EXP",
            DocModule::Journal => "JRN",
        }
    }

    /// Stable snake_case name used in persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocModule::Invoice => "invoice",
            DocModule::Payment => "payment",
            DocModule::CreditNote => "credit_note",
            DocModule::Expense => "expense",
            DocModule::Journal => "journal",
        }
    }

    pub fn all() -> &'static [DocModule] {
        &[
            DocModule::Invoice,
            DocModule::Payment,
            DocModule::CreditNote,
            DocModule::Expense,
            DocModule::Journal,
        ]
    }
}

impl fmt::Display for DocModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocModule {
    type Err = SeriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocModule::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SeriesError::UnknownModule(s.to_string()))
    }
}

/// A number-series counter row.
///
/// `current_number` is the last allocated sequence (0 for a fresh row
/// pre-insert); it is monotonically non-decreasing for a given key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberSeries {
    pub org_id: OrgId,
    pub module: DocModule,
    pub fiscal_year: FiscalYear,
    pub prefix: String,
    pub current_number: i64,
}

impl NumberSeries {
    fn fresh(org_id: OrgId, module: DocModule, fiscal_year: FiscalYear, first: i64) -> Self {
        Self {
            org_id,
            module,
            fiscal_year,
            prefix: module.prefix().to_string(),
            current_number: first,
        }
    }

    /// Formats a document number for a given sequence in this series.
    pub fn format(&self, sequence: i64) -> String {
        format_number(&self.prefix, self.fiscal_year, sequence)
    }
}

/// `{prefix}-{fy label}-{sequence zero-padded to 4}`.
pub fn format_number(prefix: &str, fiscal_year: FiscalYear, sequence: i64) -> String {
    format!("{}-{}-{:04}", prefix, fiscal_year.label(), sequence)
}

fn resolve_fiscal_year(clock: &dyn Clock, fiscal_year: Option<FiscalYear>) -> FiscalYear {
    fiscal_year.unwrap_or_else(|| FiscalYear::from_date(clock.today_ist()))
}

/// Allocates the next document number for `(org, module, fiscal year)`.
///
/// Reads or lazily creates the series row inside the caller's
/// transaction and advances the counter. A concurrent lazy creation is
/// detected via the unique-violation on insert and resolved by
/// re-reading the winner's row.
pub async fn next_number<S>(
    tx: &mut S,
    clock: &dyn Clock,
    org_id: OrgId,
    module: DocModule,
    fiscal_year: Option<FiscalYear>,
) -> Result<String, SeriesError>
where
    S: SeriesStore + ?Sized,
{
    let fy = resolve_fiscal_year(clock, fiscal_year);

    if let Some(series) = tx.find_series(org_id, module, fy).await? {
        let seq = series.current_number + 1;
        tx.set_current_number(org_id, module, fy, seq).await?;
        return Ok(series.format(seq));
    }

    let fresh = NumberSeries::fresh(org_id, module, fy, 1);
    match tx.insert_series(fresh.clone()).await {
        Ok(()) => Ok(fresh.format(1)),
        Err(err) if err.is_unique_violation() => {
            // Lost the creation race; the winner's row is now visible.
            let series = tx
                .find_series(org_id, module, fy)
                .await?
                .ok_or(err)?;
            let seq = series.current_number + 1;
            tx.set_current_number(org_id, module, fy, seq).await?;
            Ok(series.format(seq))
        }
        Err(err) => Err(err.into()),
    }
}

/// Computes what the next number would be without mutating state.
///
/// Inherently racy against concurrent allocation: for UI preview only,
/// never a uniqueness guarantee.
pub async fn peek_next_number<S>(
    tx: &mut S,
    clock: &dyn Clock,
    org_id: OrgId,
    module: DocModule,
    fiscal_year: Option<FiscalYear>,
) -> Result<String, SeriesError>
where
    S: SeriesStore + ?Sized,
{
    let fy = resolve_fiscal_year(clock, fiscal_year);
    let next = match tx.find_series(org_id, module, fy).await? {
        Some(series) => series.current_number + 1,
        None => 1,
    };
    Ok(format_number(module.prefix(), fy, next))
}

static MANUAL_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]+)-(\d{4}-\d{2})-(\d+)$").expect("valid pattern"));

/// Advances the series counter to match a manually entered number.
///
/// Keeps auto-numbering consistent after a caller-supplied number is
/// accepted: if `manual` conforms to this module's series format and its
/// sequence exceeds the stored counter, the counter jumps to it.
/// Non-conforming numbers (free-form legacy formats) are silently
/// ignored.
pub async fn bump_if_higher<S>(
    tx: &mut S,
    org_id: OrgId,
    module: DocModule,
    manual: &str,
) -> Result<(), SeriesError>
where
    S: SeriesStore + ?Sized,
{
    let Some(caps) = MANUAL_NUMBER.captures(manual) else {
        debug!(%org_id, %module, manual, "manual number does not match series format, skipping bump");
        return Ok(());
    };
    if &caps[1] != module.prefix() {
        debug!(%org_id, %module, manual, "manual number prefix does not match module, skipping bump");
        return Ok(());
    }
    let Ok(fy) = caps[2].parse::<FiscalYear>() else {
        debug!(%org_id, %module, manual, "manual number fiscal year is invalid, skipping bump");
        return Ok(());
    };
    let Ok(sequence) = caps[3].parse::<i64>() else {
        return Ok(());
    };

    match tx.find_series(org_id, module, fy).await? {
        Some(series) if series.current_number >= sequence => Ok(()),
        Some(_) => {
            tx.set_current_number(org_id, module, fy, sequence).await?;
            Ok(())
        }
        None => {
            let row = NumberSeries::fresh(org_id, module, fy, sequence);
            match tx.insert_series(row).await {
                Ok(()) => Ok(()),
                Err(err) if err.is_unique_violation() => {
                    // Creation race: retry against the winner's row.
                    if let Some(series) = tx.find_series(org_id, module, fy).await? {
                        if series.current_number < sequence {
                            tx.set_current_number(org_id, module, fy, sequence).await?;
                        }
                    }
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySeriesStore;
    use chrono::NaiveDate;
    use core_kernel::FixedClock;

    fn clock() -> FixedClock {
        FixedClock::on_ist_date(NaiveDate::from_ymd_opt(2024, 7, 15).unwrap())
    }

    #[tokio::test]
    async fn test_first_allocation_creates_series() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();

        let number = next_number(&mut tx, &clock(), org, DocModule::Invoice, None)
            .await
            .unwrap();
        assert_eq!(number, "INV-2024-25-0001");
    }

    #[tokio::test]
    async fn test_sequential_allocations_are_monotonic() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();
        let c = clock();

        let mut numbers = Vec::new();
        for _ in 0..5 {
            numbers.push(
                next_number(&mut tx, &c, org, DocModule::Payment, None)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(
            numbers,
            vec![
                "PAY-2024-25-0001",
                "PAY-2024-25-0002",
                "PAY-2024-25-0003",
                "PAY-2024-25-0004",
                "PAY-2024-25-0005",
            ]
        );
    }

    #[tokio::test]
    async fn test_series_are_independent_per_module_and_fy() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();
        let c = clock();

        let inv = next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();
        let cn = next_number(&mut tx, &c, org, DocModule::CreditNote, None)
            .await
            .unwrap();
        assert_eq!(inv, "INV-2024-25-0001");
        assert_eq!(cn, "CN-2024-25-0001");

        let prev_fy = next_number(
            &mut tx,
            &c,
            org,
            DocModule::Invoice,
            Some(FiscalYear::starting(2023)),
        )
        .await
        .unwrap();
        assert_eq!(prev_fy, "INV-2023-24-0001");
    }

    #[tokio::test]
    async fn test_fiscal_year_defaults_from_ist_date() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();
        // Midnight IST on April 1 is March 31 UTC; the IST date must win.
        let c = FixedClock::on_ist_date(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());

        let number = next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();
        assert_eq!(number, "INV-2025-26-0001");
    }

    #[tokio::test]
    async fn test_peek_does_not_mutate() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();
        let c = clock();

        let peeked = peek_next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();
        assert_eq!(peeked, "INV-2024-25-0001");

        // Peeking again yields the same value; allocation then matches it.
        let peeked_again = peek_next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();
        assert_eq!(peeked_again, peeked);

        let allocated = next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();
        assert_eq!(allocated, peeked);
    }

    #[tokio::test]
    async fn test_bump_if_higher_advances_counter() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();
        let c = clock();

        next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();

        bump_if_higher(&mut tx, org, DocModule::Invoice, "INV-2024-25-0042")
            .await
            .unwrap();

        let next = next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();
        assert_eq!(next, "INV-2024-25-0043");
    }

    #[tokio::test]
    async fn test_bump_if_lower_is_a_no_op() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();
        let c = clock();

        for _ in 0..3 {
            next_number(&mut tx, &c, org, DocModule::Invoice, None)
                .await
                .unwrap();
        }

        bump_if_higher(&mut tx, org, DocModule::Invoice, "INV-2024-25-0002")
            .await
            .unwrap();

        let next = next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();
        assert_eq!(next, "INV-2024-25-0004");
    }

    #[tokio::test]
    async fn test_bump_creates_missing_series() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();
        let c = clock();

        bump_if_higher(&mut tx, org, DocModule::CreditNote, "CN-2024-25-0007")
            .await
            .unwrap();

        let next = next_number(&mut tx, &c, org, DocModule::CreditNote, None)
            .await
            .unwrap();
        assert_eq!(next, "CN-2024-25-0008");
    }

    #[tokio::test]
    async fn test_bump_ignores_non_conforming_numbers() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();
        let c = clock();

        // Legacy free-form numbers, wrong prefixes, and bad fiscal years
        // are all tolerated silently.
        for manual in [
            "LEGACY/2024/99",
            "PAY-2024-25-0099",
            "INV-2024-99-0099",
            "inv-2024-25-0099",
            "",
        ] {
            bump_if_higher(&mut tx, org, DocModule::Invoice, manual)
                .await
                .unwrap();
        }

        let next = next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();
        assert_eq!(next, "INV-2024-25-0001");
    }

    #[tokio::test]
    async fn test_sequence_width_grows_past_9999() {
        let mut tx = MemorySeriesStore::new();
        let org = OrgId::new();
        let c = clock();

        bump_if_higher(&mut tx, org, DocModule::Invoice, "INV-2024-25-9999")
            .await
            .unwrap();
        let next = next_number(&mut tx, &c, org, DocModule::Invoice, None)
            .await
            .unwrap();
        assert_eq!(next, "INV-2024-25-10000");
    }
}
