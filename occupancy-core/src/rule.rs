//! Schedule rules: named exceptions to a site's base weekly hours.
//!
//! A rule is either a one-off date or a recurrence. Both live in the same
//! closed [`RecurrenceSpec`] so every consumer matches exhaustively.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, ScheduleResult};
use crate::hours::{Hours, end_of_day};

pub type RuleId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Days,
    Weeks,
}

impl IntervalUnit {
    pub fn step(self, every: u32) -> Duration {
        match self {
            IntervalUnit::Days => Duration::days(i64::from(every)),
            IntervalUnit::Weeks => Duration::weeks(i64::from(every)),
        }
    }
}

/// Where a date sits inside a multi-day span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanPosition {
    First,
    Middle,
    Last,
    /// Span of a single day: first-day open, last-day close.
    Only,
}

/// A multi-day occupancy span with its own hours for the boundary days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub first_day: Hours,
    pub middle_days: Hours,
    pub last_day: Hours,
}

impl DateRange {
    /// Hotel-style stay: open from check-in on the first day, all day in
    /// between, until check-out on the last day.
    pub fn check_in_out(start: NaiveDate, end: NaiveDate, check_in: NaiveTime, check_out: NaiveTime) -> Self {
        Self {
            start,
            end,
            first_day: Hours::open(check_in, end_of_day()),
            middle_days: Hours::all_day(),
            last_day: Hours::open(NaiveTime::MIN, check_out),
        }
    }

    pub fn position(&self, date: NaiveDate) -> Option<SpanPosition> {
        if date < self.start || date > self.end {
            return None;
        }
        Some(match (date == self.start, date == self.end) {
            (true, true) => SpanPosition::Only,
            (true, false) => SpanPosition::First,
            (false, true) => SpanPosition::Last,
            (false, false) => SpanPosition::Middle,
        })
    }

    pub fn hours_at(&self, position: SpanPosition) -> Hours {
        match position {
            SpanPosition::First => self.first_day,
            SpanPosition::Middle => self.middle_days,
            SpanPosition::Last => self.last_day,
            SpanPosition::Only => {
                if self.first_day.closed || self.last_day.closed {
                    Hours::closed()
                } else {
                    Hours {
                        closed: false,
                        open: self.first_day.open,
                        close: self.last_day.close,
                    }
                }
            }
        }
    }
}

/// When a rule applies. Expansion is a pure function of (variant, year).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceSpec {
    FixedDate { month: u32, day: u32 },
    /// `occurrence` counts forward from 1; -1 means the last one in the month.
    NthWeekday { month: u32, weekday: Weekday, occurrence: i8 },
    WeeklyDays { days: Vec<Weekday> },
    DateRangeDaily(DateRange),
    Interval { every: u32, unit: IntervalUnit, anchor: NaiveDate },
    Single { date: NaiveDate },
}

impl RecurrenceSpec {
    pub fn is_single(&self) -> bool {
        matches!(self, RecurrenceSpec::Single { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecurrenceSpec::FixedDate { .. } => "fixed_date",
            RecurrenceSpec::NthWeekday { .. } => "nth_weekday",
            RecurrenceSpec::WeeklyDays { .. } => "weekly_days",
            RecurrenceSpec::DateRangeDaily(_) => "date_range_daily",
            RecurrenceSpec::Interval { .. } => "interval",
            RecurrenceSpec::Single { .. } => "single",
        }
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        match self {
            RecurrenceSpec::FixedDate { month, day } => {
                check_month(*month)?;
                if !(1..=31).contains(day) {
                    return Err(ScheduleError::validation("day", format!("{day} is not in 1..=31")));
                }
            }
            RecurrenceSpec::NthWeekday { month, occurrence, .. } => {
                check_month(*month)?;
                if !matches!(occurrence, 1..=5 | -1) {
                    return Err(ScheduleError::validation(
                        "occurrence",
                        format!("{occurrence} must be 1..=5 or -1 (last)"),
                    ));
                }
            }
            RecurrenceSpec::WeeklyDays { days } => {
                if days.is_empty() {
                    return Err(ScheduleError::validation("days", "at least one weekday is required"));
                }
            }
            RecurrenceSpec::DateRangeDaily(range) => {
                if range.end < range.start {
                    return Err(ScheduleError::validation(
                        "end",
                        format!("{} is before start {}", range.end, range.start),
                    ));
                }
                range.first_day.validate()?;
                range.middle_days.validate()?;
                range.last_day.validate()?;
            }
            RecurrenceSpec::Interval { every, .. } => {
                if *every == 0 {
                    return Err(ScheduleError::validation("every", "must be at least 1"));
                }
            }
            RecurrenceSpec::Single { .. } => {}
        }
        Ok(())
    }
}

fn check_month(month: u32) -> ScheduleResult<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(ScheduleError::validation("month", format!("{month} is not in 1..=12")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: RuleId,
    pub site_id: String,
    pub name: String,
    /// Ignored for date ranges, which carry per-position hours.
    pub hours: Hours,
    pub recurrence: RecurrenceSpec,
    /// Never projects before this date.
    pub effective_from: NaiveDate,
    /// Set when the rule is partially retired.
    pub effective_to: Option<NaiveDate>,
    #[serde(default)]
    pub retired: bool,
    /// Rule this one continues after a forward-only edit.
    #[serde(default)]
    pub supersedes: Option<RuleId>,
    pub created_at: DateTime<Utc>,
}

impl ScheduleRule {
    pub fn is_recurring(&self) -> bool {
        !self.recurrence.is_single()
    }

    pub fn in_window(&self, date: NaiveDate) -> bool {
        date >= self.effective_from && self.effective_to.is_none_or(|to| date <= to)
    }

    /// Hours that apply on `date`, with the span position for date ranges.
    pub fn hours_on(&self, date: NaiveDate) -> (Hours, Option<SpanPosition>) {
        match &self.recurrence {
            RecurrenceSpec::DateRangeDaily(range) => match range.position(date) {
                Some(pos) => (range.hours_at(pos), Some(pos)),
                None => (self.hours, None),
            },
            _ => (self.hours, None),
        }
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        if self.name.trim().is_empty() {
            return Err(ScheduleError::validation("name", "must be non-empty"));
        }
        if self.site_id.trim().is_empty() {
            return Err(ScheduleError::validation("site_id", "must be non-empty"));
        }
        self.recurrence.validate()?;
        if !matches!(self.recurrence, RecurrenceSpec::DateRangeDaily(_)) {
            self.hours.validate()?;
        }
        if let Some(to) = self.effective_to {
            if to < self.effective_from {
                return Err(ScheduleError::validation(
                    "effective_to_date",
                    format!("{to} is before effective_from_date {}", self.effective_from),
                ));
            }
        }
        Ok(())
    }
}

/// Input for rule creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub site_id: String,
    pub name: String,
    pub hours: Hours,
    pub recurrence: RecurrenceSpec,
    /// Defaults to today for recurrences and to the date itself for singles.
    pub effective_from: Option<NaiveDate>,
}

/// Forward-only edit payload; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleEdit {
    pub name: Option<String>,
    pub hours: Option<Hours>,
    pub recurrence: Option<RecurrenceSpec>,
}

impl RuleEdit {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.hours.is_none() && self.recurrence.is_none()
    }

    pub fn apply_to(&self, rule: &mut ScheduleRule) {
        if let Some(name) = &self.name {
            rule.name = name.clone();
        }
        if let Some(hours) = self.hours {
            rule.hours = hours;
        }
        if let Some(recurrence) = &self.recurrence {
            rule.recurrence = recurrence.clone();
        }
    }
}
