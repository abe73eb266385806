//! Calendar month periods.
//!
//! Billing and occupancy are both bucketed by whole calendar months. A
//! [`Period`] is stored as the first day of its month, so ordering and
//! hashing follow the calendar.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar month (e.g. `2024-01`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    /// First day of the month.
    start: NaiveDate,
}

/// Number of days in a calendar month, 0 for an out-of-range month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return 0;
    };
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| u32::try_from((next - first).num_days()).ok())
        .unwrap_or(0)
}

impl Period {
    /// Create a period from year and month (1-12).
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::period(format!("month out of range: {month}")));
        }
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|start| Self { start })
            .ok_or_else(|| Error::period(format!("year out of range: {year}")))
    }

    /// The period containing a calendar date.
    pub fn containing_date(date: NaiveDate) -> Self {
        Self {
            start: date - Days::new(u64::from(date.day0())),
        }
    }

    /// The period containing a UTC timestamp.
    pub fn containing(ts: DateTime<Utc>) -> Self {
        Self::containing_date(ts.date_naive())
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month(&self) -> u32 {
        self.start.month()
    }

    /// First day of the period.
    pub fn first_day(&self) -> NaiveDate {
        self.start
    }

    /// First day of the following period (exclusive end).
    pub fn end_exclusive(&self) -> NaiveDate {
        self.start + Days::new(u64::from(self.days()))
    }

    /// Number of days in the period.
    pub fn days(&self) -> u32 {
        days_in_month(self.year(), self.month())
    }

    /// The following period.
    pub fn next(&self) -> Period {
        Self {
            start: self.end_exclusive(),
        }
    }

    /// Start of the period as a UTC timestamp (midnight on the first day).
    pub fn start_ts(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Exclusive end of the period as a UTC timestamp.
    pub fn end_ts(&self) -> DateTime<Utc> {
        self.end_exclusive().and_time(NaiveTime::MIN).and_utc()
    }

    /// Whether a timestamp falls inside the period.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start_ts() && ts < self.end_ts()
    }

    /// All periods from `from` to `to`, both inclusive. Empty if `to < from`.
    pub fn range_inclusive(from: Period, to: Period) -> Vec<Period> {
        let mut periods = Vec::new();
        let mut current = from;
        while current <= to {
            periods.push(current);
            current = current.next();
        }
        periods
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (year, month) = trimmed
            .split_once('-')
            .ok_or_else(|| Error::period(format!("expected YYYY-MM, got '{trimmed}'")))?;
        let year: i32 = year
            .parse()
            .map_err(|_| Error::period(format!("invalid year in '{trimmed}'")))?;
        let month: u32 = month
            .parse()
            .map_err(|_| Error::period(format!("invalid month in '{trimmed}'")))?;
        Period::new(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(2024, 6), 30);
        assert_eq!(days_in_month(2024, 12), 31);
        assert_eq!(days_in_month(2024, 13), 0);
    }

    #[test]
    fn test_containing() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 17, 13, 45, 0).unwrap();
        let period = Period::containing(ts);
        assert_eq!(period, Period::new(2024, 3).unwrap());
        assert!(period.contains(ts));
        assert!(!period.contains(period.end_ts()));
    }

    #[test]
    fn test_next_wraps_year() {
        let dec = Period::new(2023, 12).unwrap();
        assert_eq!(dec.next(), Period::new(2024, 1).unwrap());
        assert_eq!(dec.end_exclusive(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_parse_and_display() {
        let period: Period = "2024-01".parse().unwrap();
        assert_eq!(period.to_string(), "2024-01");
        assert!("2024-13".parse::<Period>().is_err());
        assert!("202401".parse::<Period>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let period = Period::new(2024, 7).unwrap();
        let json = serde_json::to_string(&period).unwrap();
        assert_eq!(json, "\"2024-07\"");
        let back: Period = serde_json::from_str(&json).unwrap();
        assert_eq!(back, period);
    }

    #[test]
    fn test_range_inclusive() {
        let from = Period::new(2023, 11).unwrap();
        let to = Period::new(2024, 2).unwrap();
        let range = Period::range_inclusive(from, to);
        assert_eq!(range.len(), 4);
        assert_eq!(range[2], Period::new(2024, 1).unwrap());
        assert!(Period::range_inclusive(to, from).is_empty());
    }
}
