//! Recurrence expansion: (spec, year) -> concrete calendar dates.
//!
//! Pure and deterministic. Dates come back sorted and deduplicated; zone and
//! time-of-day concerns belong to the phase resolver. The rule's effective
//! window is applied by the caller.

use chrono::{Datelike, NaiveDate};

use crate::hours::Hours;
use crate::rule::{DateRange, RecurrenceSpec, SpanPosition};

/// Hours attached to a date produced by a multi-day span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanHours {
    pub position: SpanPosition,
    pub hours: Hours,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectedDate {
    pub date: NaiveDate,
    pub span: Option<SpanHours>,
}

impl ProjectedDate {
    fn plain(date: NaiveDate) -> Self {
        Self { date, span: None }
    }
}

/// Expand `spec` for one calendar year.
///
/// A variant that resolves to nothing in `year` (Feb 30, a 5th Monday that
/// does not exist) yields an empty vector.
pub fn expand(spec: &RecurrenceSpec, year: i32) -> Vec<ProjectedDate> {
    let (Some(jan1), Some(dec31)) = (NaiveDate::from_ymd_opt(year, 1, 1), NaiveDate::from_ymd_opt(year, 12, 31))
    else {
        return vec![];
    };

    match spec {
        RecurrenceSpec::FixedDate { month, day } => NaiveDate::from_ymd_opt(year, *month, *day)
            .map(ProjectedDate::plain)
            .into_iter()
            .collect(),

        RecurrenceSpec::NthWeekday {
            month,
            weekday,
            occurrence,
        } => {
            let matches: Vec<NaiveDate> = (1..=31)
                .filter_map(|day| NaiveDate::from_ymd_opt(year, *month, day))
                .filter(|d| d.weekday() == *weekday)
                .collect();
            let picked = match *occurrence {
                -1 => matches.last().copied(),
                k if k > 0 => matches.get(k as usize - 1).copied(),
                _ => None,
            };
            picked.map(ProjectedDate::plain).into_iter().collect()
        }

        RecurrenceSpec::WeeklyDays { days } => jan1
            .iter_days()
            .take_while(|d| *d <= dec31)
            .filter(|d| days.contains(&d.weekday()))
            .map(ProjectedDate::plain)
            .collect(),

        RecurrenceSpec::DateRangeDaily(range) => expand_range(range, jan1, dec31),

        RecurrenceSpec::Interval { every, unit, anchor } => {
            if *every == 0 || *anchor > dec31 {
                return vec![];
            }
            let step = unit.step(*every);
            let step_days = step.num_days();
            let mut cursor = *anchor;
            if cursor < jan1 {
                // jump to the first step on or after Jan 1
                let behind = (jan1 - cursor).num_days();
                let steps = (behind + step_days - 1) / step_days;
                match cursor.checked_add_signed(chrono::Duration::days(steps * step_days)) {
                    Some(next) => cursor = next,
                    None => return vec![],
                }
            }
            let mut out = Vec::new();
            while cursor <= dec31 {
                out.push(ProjectedDate::plain(cursor));
                // steps past the last representable date end the series
                match cursor.checked_add_signed(step) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
            out
        }

        RecurrenceSpec::Single { date } => {
            if date.year() == year {
                vec![ProjectedDate::plain(*date)]
            } else {
                vec![]
            }
        }
    }
}

fn expand_range(range: &DateRange, jan1: NaiveDate, dec31: NaiveDate) -> Vec<ProjectedDate> {
    let from = range.start.max(jan1);
    let to = range.end.min(dec31);
    if from > to {
        return vec![];
    }
    from.iter_days()
        .take_while(|d| *d <= to)
        .filter_map(|date| {
            range.position(date).map(|position| ProjectedDate {
                date,
                span: Some(SpanHours {
                    position,
                    hours: range.hours_at(position),
                }),
            })
        })
        .collect()
}

/// Expand every year overlapping `[from, to]` and keep dates inside it.
pub fn expand_between(spec: &RecurrenceSpec, from: NaiveDate, to: NaiveDate) -> Vec<ProjectedDate> {
    if to < from {
        return vec![];
    }
    (from.year()..=to.year())
        .flat_map(|year| expand(spec, year))
        .filter(|p| p.date >= from && p.date <= to)
        .collect()
}

/// Years a recurrence can possibly produce dates in, if bounded.
pub fn bounded_years(spec: &RecurrenceSpec) -> Option<(i32, i32)> {
    match spec {
        RecurrenceSpec::Single { date } => Some((date.year(), date.year())),
        RecurrenceSpec::DateRangeDaily(range) => Some((range.start.year(), range.end.year())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{IntervalUnit, RecurrenceSpec};
    use chrono::{NaiveTime, Weekday};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn dates(v: Vec<ProjectedDate>) -> Vec<NaiveDate> {
        v.into_iter().map(|p| p.date).collect()
    }

    #[test]
    fn fixed_date_exists() {
        let spec = RecurrenceSpec::FixedDate { month: 12, day: 25 };
        assert_eq!(dates(expand(&spec, 2024)), vec![d(2024, 12, 25)]);
    }

    #[test]
    fn fixed_date_missing_day_does_not_roll_over() {
        assert!(expand(&RecurrenceSpec::FixedDate { month: 2, day: 30 }, 2024).is_empty());
        assert!(expand(&RecurrenceSpec::FixedDate { month: 4, day: 31 }, 2024).is_empty());
        let leap = RecurrenceSpec::FixedDate { month: 2, day: 29 };
        assert_eq!(dates(expand(&leap, 2024)), vec![d(2024, 2, 29)]);
        assert!(expand(&leap, 2023).is_empty());
    }

    #[test]
    fn thanksgiving_2024() {
        let spec = RecurrenceSpec::NthWeekday {
            month: 11,
            weekday: Weekday::Thu,
            occurrence: 4,
        };
        assert_eq!(dates(expand(&spec, 2024)), vec![d(2024, 11, 28)]);
    }

    #[test]
    fn nth_weekday_is_the_kth_match_for_every_month() {
        for month in 1..=12 {
            for k in 1..=4i8 {
                let spec = RecurrenceSpec::NthWeekday {
                    month,
                    weekday: Weekday::Mon,
                    occurrence: k,
                };
                let out = dates(expand(&spec, 2025));
                assert_eq!(out.len(), 1);
                let date = out[0];
                assert_eq!(date.weekday(), Weekday::Mon);
                assert_eq!(date.month(), month);
                assert_eq!((date.day() - 1) / 7 + 1, k as u32);
            }
        }
    }

    #[test]
    fn last_weekday_of_month() {
        // Memorial Day 2024
        let spec = RecurrenceSpec::NthWeekday {
            month: 5,
            weekday: Weekday::Mon,
            occurrence: -1,
        };
        assert_eq!(dates(expand(&spec, 2024)), vec![d(2024, 5, 27)]);
    }

    #[test]
    fn missing_fifth_weekday_is_empty() {
        // Feb 2023 has four Mondays
        let spec = RecurrenceSpec::NthWeekday {
            month: 2,
            weekday: Weekday::Mon,
            occurrence: 5,
        };
        assert!(expand(&spec, 2023).is_empty());
        // Jan 2024 has five
        let spec = RecurrenceSpec::NthWeekday {
            month: 1,
            weekday: Weekday::Mon,
            occurrence: 5,
        };
        assert_eq!(dates(expand(&spec, 2024)), vec![d(2024, 1, 29)]);
    }

    #[test]
    fn huge_interval_stops_at_the_calendar_edge() {
        let spec = RecurrenceSpec::Interval {
            every: 100_000_000,
            unit: IntervalUnit::Days,
            anchor: d(2024, 1, 1),
        };
        assert!(spec.validate().is_ok());
        assert_eq!(dates(expand(&spec, 2024)), vec![d(2024, 1, 1)]);
        assert!(expand(&spec, 2025).is_empty());

        let weeks = RecurrenceSpec::Interval {
            every: u32::MAX,
            unit: IntervalUnit::Weeks,
            anchor: d(2024, 1, 1),
        };
        assert_eq!(expand(&weeks, 2024).len(), 1);
        assert_eq!(expand_between(&weeks, d(2023, 1, 1), d(2026, 12, 31)).len(), 1);
    }

    #[test]
    fn weekly_days_cover_the_year() {
        let spec = RecurrenceSpec::WeeklyDays {
            days: vec![Weekday::Sat, Weekday::Sun],
        };
        let out = dates(expand(&spec, 2024));
        assert_eq!(out.len(), 104);
        assert_eq!(out.first(), Some(&d(2024, 1, 6)));
        assert_eq!(out.last(), Some(&d(2024, 12, 29)));
        assert!(out.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn check_in_check_out_range() {
        let range = DateRange::check_in_out(d(2024, 12, 24), d(2024, 12, 26), t(15, 0), t(11, 0));
        let out = expand(&RecurrenceSpec::DateRangeDaily(range), 2024);
        assert_eq!(out.len(), 3);

        let hours: Vec<(NaiveDate, Hours)> = out.iter().map(|p| (p.date, p.span.unwrap().hours)).collect();
        assert_eq!(hours[0], (d(2024, 12, 24), Hours::open(t(15, 0), t(23, 59))));
        assert_eq!(hours[1], (d(2024, 12, 25), Hours::open(t(0, 0), t(23, 59))));
        assert_eq!(hours[2], (d(2024, 12, 26), Hours::open(t(0, 0), t(11, 0))));
    }

    #[test]
    fn range_crossing_new_year_splits_by_year() {
        let range = DateRange::check_in_out(d(2024, 11, 1), d(2025, 1, 2), t(9, 0), t(13, 0));
        let spec = RecurrenceSpec::DateRangeDaily(range);
        let y2024 = expand(&spec, 2024);
        let y2025 = expand(&spec, 2025);
        assert_eq!(y2024.len(), 61);
        assert_eq!(y2025.len(), 2);
        assert_eq!(y2024[0].span.unwrap().position, SpanPosition::First);
        assert_eq!(y2024[60].span.unwrap().position, SpanPosition::Middle);
        assert_eq!(y2025[1].span.unwrap().position, SpanPosition::Last);
    }

    #[test]
    fn interval_from_anchor_in_prior_year() {
        let spec = RecurrenceSpec::Interval {
            every: 2,
            unit: IntervalUnit::Weeks,
            anchor: d(2023, 12, 22),
        };
        let out = dates(expand(&spec, 2024));
        assert_eq!(out[0], d(2024, 1, 5));
        assert!(out.windows(2).all(|w| (w[1] - w[0]).num_days() == 14));
        assert_eq!(out.last(), Some(&d(2024, 12, 20)));
    }

    #[test]
    fn interval_never_before_anchor() {
        let spec = RecurrenceSpec::Interval {
            every: 10,
            unit: IntervalUnit::Days,
            anchor: d(2024, 12, 15),
        };
        assert_eq!(dates(expand(&spec, 2024)), vec![d(2024, 12, 15), d(2024, 12, 25)]);
        assert!(expand(&spec, 2023).is_empty());
    }

    #[test]
    fn single_only_in_its_year() {
        let spec = RecurrenceSpec::Single { date: d(2024, 7, 4) };
        assert_eq!(dates(expand(&spec, 2024)), vec![d(2024, 7, 4)]);
        assert!(expand(&spec, 2025).is_empty());
    }

    #[test]
    fn expansion_is_deterministic() {
        let spec = RecurrenceSpec::WeeklyDays {
            days: vec![Weekday::Wed, Weekday::Mon],
        };
        assert_eq!(expand(&spec, 2026), expand(&spec, 2026));
    }

    #[test]
    fn expand_between_clips_to_bounds() {
        let spec = RecurrenceSpec::FixedDate { month: 1, day: 1 };
        let out = dates(expand_between(&spec, d(2024, 6, 1), d(2026, 1, 1)));
        assert_eq!(out, vec![d(2025, 1, 1), d(2026, 1, 1)]);
        assert!(expand_between(&spec, d(2026, 1, 2), d(2026, 1, 1)).is_empty());
    }
}
