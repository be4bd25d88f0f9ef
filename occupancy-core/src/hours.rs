//! Operating hours: a single day's window and a site's base week.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, ScheduleResult};

/// One day's operating window. `closed` wins over any times present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hours {
    pub closed: bool,
    pub open: Option<NaiveTime>,
    pub close: Option<NaiveTime>,
}

impl Hours {
    pub fn closed() -> Self {
        Self {
            closed: true,
            open: None,
            close: None,
        }
    }

    pub fn open(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            closed: false,
            open: Some(open),
            close: Some(close),
        }
    }

    /// Open for the whole calendar day, as far as HH:MM resolution goes.
    pub fn all_day() -> Self {
        Self::open(NaiveTime::MIN, end_of_day())
    }

    /// Reject open days without both times or with close not after open.
    pub fn validate(&self) -> ScheduleResult<()> {
        if self.closed {
            return Ok(());
        }
        let open = self
            .open
            .ok_or_else(|| ScheduleError::validation("open_time", "required unless closed"))?;
        let close = self
            .close
            .ok_or_else(|| ScheduleError::validation("close_time", "required unless closed"))?;
        if close <= open {
            return Err(ScheduleError::validation(
                "close_time",
                format!("{} is not after open_time {}", close.format("%H:%M"), open.format("%H:%M")),
            ));
        }
        Ok(())
    }

    /// `open <= t < close`. Incomplete open hours count as not open.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.closed {
            return false;
        }
        match (self.open, self.close) {
            (Some(open), Some(close)) => open <= t && t < close,
            _ => false,
        }
    }

    /// Open day with a missing bound: a data error, not a closure.
    pub fn is_incomplete(&self) -> bool {
        !self.closed && (self.open.is_none() || self.close.is_none())
    }
}

/// 23:59, the close time used for "until the end of the day".
pub fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
}

/// Base hours for each weekday, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyHours {
    days: [Hours; 7],
}

impl Default for WeeklyHours {
    fn default() -> Self {
        Self {
            days: [Hours::closed(); 7],
        }
    }
}

impl WeeklyHours {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same window Monday..Friday, closed on the weekend.
    pub fn weekdays(open: NaiveTime, close: NaiveTime) -> Self {
        let mut w = Self::default();
        for d in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            w.set(d, Hours::open(open, close));
        }
        w
    }

    pub fn with(mut self, day: Weekday, hours: Hours) -> Self {
        self.set(day, hours);
        self
    }

    pub fn set(&mut self, day: Weekday, hours: Hours) {
        self.days[day.num_days_from_monday() as usize] = hours;
    }

    pub fn get(&self, day: Weekday) -> Hours {
        self.days[day.num_days_from_monday() as usize]
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        self.days.iter().try_for_each(Hours::validate)
    }
}
