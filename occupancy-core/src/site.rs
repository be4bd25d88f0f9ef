//! Sites: the tenant-scoped unit that owns rules, zones and a timezone.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, ScheduleResult};
use crate::hours::WeeklyHours;
use crate::time::{LocalInstant, LocalToday, parse_timezone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    /// IANA zone, e.g. "America/Chicago".
    pub timezone: String,
    pub weekly_hours: WeeklyHours,
}

impl Site {
    pub fn new(id: impl Into<String>, name: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            timezone: timezone.into(),
            weekly_hours: WeeklyHours::default(),
        }
    }

    pub fn with_hours(mut self, weekly_hours: WeeklyHours) -> Self {
        self.weekly_hours = weekly_hours;
        self
    }

    pub fn tz(&self) -> ScheduleResult<Tz> {
        parse_timezone(&self.timezone)
    }

    pub fn today(&self, now_utc: DateTime<Utc>) -> ScheduleResult<LocalToday> {
        Ok(LocalToday::from_utc(now_utc, self.tz()?))
    }

    pub fn local(&self, now_utc: DateTime<Utc>) -> ScheduleResult<LocalInstant> {
        Ok(LocalInstant::from_utc(now_utc, self.tz()?))
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        if self.id.trim().is_empty() {
            return Err(ScheduleError::validation("site_id", "must be non-empty"));
        }
        self.tz()?;
        self.weekly_hours.validate()
    }
}
