//! Time utilities: site-local calendar dates from UTC instants.
//!
//! Every "today" boundary in the engine is the site's local date, computed
//! once per request and passed down as a [`LocalToday`].

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, ScheduleResult};

/// Parse an IANA timezone name like "America/Chicago".
pub fn parse_timezone(tz: &str) -> ScheduleResult<Tz> {
    tz.parse::<Tz>()
        .map_err(|_| ScheduleError::validation("timezone", format!("unknown IANA timezone: {tz}")))
}

/// Parse "HH:MM" (24h).
pub fn parse_hhmm(s: &str) -> ScheduleResult<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| ScheduleError::validation("time", format!("'{s}' is not HH:MM: {e}")))
}

/// The site-local calendar date a request treats as "today", plus the
/// instant it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalToday {
    date: NaiveDate,
    as_of: DateTime<Utc>,
}

impl LocalToday {
    pub fn from_utc(now_utc: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            date: now_utc.with_timezone(&tz).date_naive(),
            as_of: now_utc,
        }
    }

    /// Fixed local date, stamped at midnight UTC of that date.
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date,
            as_of: date.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    pub fn date(self) -> NaiveDate {
        self.date
    }

    pub fn as_of(self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn yesterday(self) -> NaiveDate {
        self.date - Duration::days(1)
    }

    /// Strictly before today: frozen history.
    pub fn is_past(self, date: NaiveDate) -> bool {
        date < self.date
    }
}

/// A UTC instant seen on the site's wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalInstant {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl LocalInstant {
    pub fn from_utc(now_utc: DateTime<Utc>, tz: Tz) -> Self {
        let local = now_utc.with_timezone(&tz);
        Self {
            date: local.date_naive(),
            time: local.time(),
        }
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }
}

/// Last calendar day of `year`.
pub fn year_end(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 12, 31)
}
