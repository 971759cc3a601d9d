//! Capture time guessed from file and folder names

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(19[89]\d|20\d\d)\D?(0\d|1[0-2])\D?([0-3]\d)\D{0,1}([01]\d|2[0-4])?\D?([0-5]\d)?\D?([0-5]\d)?",
    )
    .unwrap()
});

/// Reads dates like `2023-07-20 14:15:30` or `20171111030039` out of paths
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameClock {
    /// Zone the names are written in, the local zone when `None`
    tz: Option<Tz>,
}

impl FilenameClock {
    pub fn new(tz: Option<Tz>) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Option<Tz> {
        self.tz
    }

    /// Interpret a wall-clock time in the configured zone
    pub fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.tz {
            Some(tz) => tz
                .from_local_datetime(&naive)
                .single()
                .map(|d| d.with_timezone(&Utc)),
            None => Local
                .from_local_datetime(&naive)
                .single()
                .map(|d| d.with_timezone(&Utc)),
        }
    }

    /// Scan path components from the file name up to the root
    ///
    /// The first component holding a valid date wins. When none does, the
    /// whole path is tried so that `2024/06/06/file.png` still yields a date.
    pub fn take_time_from_path(&self, path: &str) -> Option<DateTime<Utc>> {
        path.rsplit(['/', '\\'])
            .find_map(|part| self.take_time_from_name(part))
            .or_else(|| self.take_time_from_name(path))
    }

    /// Date found in a single name
    ///
    /// Only the leftmost match is considered. It is rejected when the
    /// calendar date is not canonical or lies more than 24 h in the future.
    pub fn take_time_from_name(&self, name: &str) -> Option<DateTime<Utc>> {
        let caps = TIME_RE.captures(name)?;
        let field = |i: usize| -> u32 {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
        let date = NaiveDate::from_ymd_opt(year, field(2), field(3))?;
        let naive = date.and_hms_opt(field(4), field(5), field(6))?;
        let instant = self.localize(naive)?;

        if instant - Utc::now() > Duration::hours(24) {
            return None;
        }
        Some(instant)
    }
}
