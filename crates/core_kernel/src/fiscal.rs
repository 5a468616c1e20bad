//! Fiscal calendar and clock abstractions
//!
//! Indian GST accounting runs on an April–March fiscal year; document
//! number series reset at each fiscal-year boundary. The boundary is a
//! civil-calendar fact, so "today" is always taken in `Asia/Kolkata`,
//! never UTC.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Asia::Kolkata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors related to fiscal-year handling
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FiscalError {
    #[error("Invalid fiscal year label: {0}")]
    InvalidLabel(String),
}

/// An April–March fiscal year, identified by its starting calendar year.
///
/// `FiscalYear { start_year: 2024 }` covers 2024-04-01 through 2025-03-31
/// and renders as `2024-25`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FiscalYear {
    start_year: i32,
}

impl FiscalYear {
    pub fn starting(start_year: i32) -> Self {
        Self { start_year }
    }

    /// Fiscal year containing the given calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        let start_year = if date.month() >= 4 {
            date.year()
        } else {
            date.year() - 1
        };
        Self { start_year }
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    /// First day of the fiscal year (April 1).
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.start_year, 4, 1).expect("April 1 always exists")
    }

    /// Last day of the fiscal year (March 31).
    pub fn last_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.start_year + 1, 3, 31).expect("March 31 always exists")
    }

    /// Label used in document numbers, e.g. `2024-25`.
    pub fn label(&self) -> String {
        format!("{}-{:02}", self.start_year, (self.start_year + 1).rem_euclid(100))
    }

    pub fn next(&self) -> Self {
        Self { start_year: self.start_year + 1 }
    }
}

impl fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for FiscalYear {
    type Err = FiscalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| FiscalError::InvalidLabel(s.to_string()))?;
        let start_year: i32 = start
            .parse()
            .map_err(|_| FiscalError::InvalidLabel(s.to_string()))?;
        let end_part: i32 = end
            .parse()
            .map_err(|_| FiscalError::InvalidLabel(s.to_string()))?;
        if end.len() != 2 || (start_year + 1).rem_euclid(100) != end_part {
            return Err(FiscalError::InvalidLabel(s.to_string()));
        }
        Ok(Self { start_year })
    }
}

/// Clock port, injected into workflows for deterministic testing.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date in `Asia/Kolkata`, the basis for fiscal-year and
    /// document-date defaults.
    fn today_ist(&self) -> NaiveDate {
        self.now().with_timezone(&Kolkata).date_naive()
    }
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed-instant clock for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Clock pinned to midnight IST on the given date.
    pub fn on_ist_date(date: NaiveDate) -> Self {
        let ist = date
            .and_hms_opt(0, 0, 0)
            .expect("midnight always exists")
            .and_local_timezone(Kolkata)
            .single()
            .expect("IST has no DST gaps");
        Self(ist.with_timezone(&Utc))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiscal_year_from_date() {
        let april = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let march = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        assert_eq!(FiscalYear::from_date(april), FiscalYear::starting(2024));
        assert_eq!(FiscalYear::from_date(march), FiscalYear::starting(2024));

        let new_fy = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        assert_eq!(FiscalYear::from_date(new_fy), FiscalYear::starting(2025));
    }

    #[test]
    fn test_label_and_parse() {
        let fy = FiscalYear::starting(2024);
        assert_eq!(fy.label(), "2024-25");
        assert_eq!("2024-25".parse::<FiscalYear>().unwrap(), fy);

        let century = FiscalYear::starting(2099);
        assert_eq!(century.label(), "2099-00");
        assert_eq!("2099-00".parse::<FiscalYear>().unwrap(), century);
    }

    #[test]
    fn test_parse_rejects_mismatched_label() {
        assert!("2024-26".parse::<FiscalYear>().is_err());
        assert!("2024".parse::<FiscalYear>().is_err());
        assert!("abcd-ef".parse::<FiscalYear>().is_err());
    }

    #[test]
    fn test_fixed_clock_ist_date() {
        let date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let clock = FixedClock::on_ist_date(date);
        assert_eq!(clock.today_ist(), date);
        // Midnight IST on April 1 is still March 31 in UTC.
        assert_eq!(
            clock.now().date_naive(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
        );
    }
}
