//! Capture date window

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use photosync_common::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Inclusive date window, unset bounds are open
///
/// Accepted forms: `YYYY`, `YYYY-MM`, `YYYY-MM-DD` (the whole period) or
/// `YYYY-MM-DD,YYYY-MM-DD` (from the first day to the end of the second).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_set(&self) -> bool {
        self.after.is_some() || self.before.is_some()
    }

    /// Whether the date falls inside the window. An unknown date only
    /// passes an unset window.
    pub fn contains(&self, date: Option<DateTime<Utc>>) -> bool {
        if !self.is_set() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.after.map_or(true, |a| date >= a) && self.before.map_or(true, |b| date <= b)
    }
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| Error::InvalidInput(format!("invalid date {:?}: {}", s, e)))
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

/// Last instant of the day
fn end_of(day: NaiveDate) -> DateTime<Utc> {
    start_of(day) + Duration::days(1) - Duration::nanoseconds(1)
}

impl FromStr for DateRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        let invalid = || Error::InvalidInput(format!("invalid date range {:?}", s));

        if let Some((from, to)) = s.split_once(',') {
            let from = parse_day(from)?;
            let to = parse_day(to)?;
            if to < from {
                return Err(invalid());
            }
            return Ok(Self {
                after: Some(start_of(from)),
                before: Some(end_of(to)),
            });
        }

        let parts: Vec<&str> = s.split('-').collect();
        let number = |p: &str| p.parse::<u32>().map_err(|_| invalid());
        let (first, last) = match parts.as_slice() {
            [y] => {
                let year = number(y)? as i32;
                (
                    NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?,
                    NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid)?,
                )
            }
            [y, m] => {
                let year = number(y)? as i32;
                let first = NaiveDate::from_ymd_opt(year, number(m)?, 1).ok_or_else(invalid)?;
                let next = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, first.month() + 1, 1)
                }
                .ok_or_else(invalid)?;
                (first, next - Duration::days(1))
            }
            [_, _, _] => {
                let day = parse_day(s)?;
                (day, day)
            }
            _ => return Err(invalid()),
        };
        Ok(Self {
            after: Some(start_of(first)),
            before: Some(end_of(last)),
        })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.after, self.before) {
            (Some(a), Some(b)) => write!(f, "{},{}", a.format("%Y-%m-%d"), b.format("%Y-%m-%d")),
            (Some(a), None) => write!(f, "{},", a.format("%Y-%m-%d")),
            (None, Some(b)) => write!(f, ",{}", b.format("%Y-%m-%d")),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap())
    }

    #[test]
    fn test_year() {
        let r: DateRange = "2023".parse().unwrap();
        assert!(r.contains(at(2023, 1, 1, 0)));
        assert!(r.contains(at(2023, 12, 31, 23)));
        assert!(!r.contains(at(2024, 1, 1, 0)));
    }

    #[test]
    fn test_month_covers_february() {
        let r: DateRange = "2024-02".parse().unwrap();
        assert!(r.contains(at(2024, 2, 29, 12)));
        assert!(!r.contains(at(2024, 3, 1, 0)));
        let r: DateRange = "2023-12".parse().unwrap();
        assert!(r.contains(at(2023, 12, 31, 23)));
    }

    #[test]
    fn test_day_span_includes_final_day() {
        let r: DateRange = "2024-07-01,2024-07-07".parse().unwrap();
        assert!(r.contains(at(2024, 7, 7, 23)));
        assert!(!r.contains(at(2024, 7, 8, 0)));
        assert!(!r.contains(at(2024, 6, 30, 23)));
        assert_eq!(r.to_string(), "2024-07-01,2024-07-07");
    }

    #[test]
    fn test_unset_and_unknown_dates() {
        let r = DateRange::default();
        assert!(r.contains(None));
        let r: DateRange = "2024".parse().unwrap();
        assert!(!r.contains(None));
    }

    #[test]
    fn test_invalid() {
        assert!("2024-13".parse::<DateRange>().is_err());
        assert!("soon".parse::<DateRange>().is_err());
        assert!("2024-07-08,2024-07-01".parse::<DateRange>().is_err());
    }
}
