//! Compact text forms for recurrences, hours and HVAC modes used on the
//! command line.
//!
//! ```text
//! single:2024-07-04            fixed:12-25
//! nth:11:thu:4                 nth:5:mon:last
//! weekly:sat,sun               weekly:mon-fri
//! range:2024-12-24..2024-12-26@15:00-11:00
//! every:2w:2024-01-05          every:10d:2024-01-01
//! ```

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, Weekday};
use occupancy_core::time::parse_hhmm;
use occupancy_core::{DateRange, FanMode, Hours, HvacMode, IntervalUnit, RecurrenceSpec, WeeklyHours};
use regex::Regex;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").with_context(|| format!("'{s}' is not YYYY-MM-DD"))
}

pub fn parse_weekday(s: &str) -> Result<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| anyhow!("'{s}' is not a weekday (mon, tue, ...)"))
}

/// `sat,sun`, `mon-fri` or a mix like `mon,wed-fri`.
pub fn parse_weekdays(s: &str) -> Result<Vec<Weekday>> {
    let mut days = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((a, b)) => {
                let start = parse_weekday(a)?.num_days_from_monday() as usize;
                let end = parse_weekday(b)?.num_days_from_monday() as usize;
                if end < start {
                    bail!("weekday range '{part}' runs backwards");
                }
                days.extend_from_slice(&WEEK[start..=end]);
            }
            None => days.push(parse_weekday(part)?),
        }
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();
    if days.is_empty() {
        bail!("no weekdays in '{s}'");
    }
    Ok(days)
}

/// `closed` or `HH:MM-HH:MM`.
pub fn parse_hours(s: &str) -> Result<Hours> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("closed") {
        return Ok(Hours::closed());
    }
    let (open, close) = s
        .split_once('-')
        .ok_or_else(|| anyhow!("'{s}' is neither 'closed' nor HH:MM-HH:MM"))?;
    let hours = Hours::open(parse_hhmm(open)?, parse_hhmm(close)?);
    hours.validate()?;
    Ok(hours)
}

/// Hours from the `--closed` / `--open` / `--close` flag trio.
pub fn hours_from_flags(closed: bool, open: Option<&str>, close: Option<&str>) -> Result<Hours> {
    match (closed, open, close) {
        (true, None, None) => Ok(Hours::closed()),
        (true, _, _) => bail!("--closed cannot be combined with --open/--close"),
        (false, Some(o), Some(c)) => {
            let hours = Hours::open(parse_hhmm(o)?, parse_hhmm(c)?);
            hours.validate()?;
            Ok(hours)
        }
        _ => bail!("pass --closed, or both --open and --close"),
    }
}

/// `mon-fri 08:00-18:00; sat 10:00-14:00; sun closed`. Unlisted days are closed.
pub fn parse_weekly_hours(s: &str) -> Result<WeeklyHours> {
    let re = Regex::new(r"^([a-zA-Z,\- ]+?)\s+(closed|\d{1,2}:\d{2}-\d{1,2}:\d{2})$")?;
    let mut weekly = WeeklyHours::new();
    for clause in s.split(';').map(str::trim).filter(|c| !c.is_empty()) {
        let caps = re
            .captures(clause)
            .ok_or_else(|| anyhow!("cannot read hours clause '{clause}'"))?;
        let hours = parse_hours(&caps[2])?;
        for day in parse_weekdays(&caps[1].replace(' ', ""))? {
            weekly.set(day, hours);
        }
    }
    Ok(weekly)
}

/// Parse a recurrence. Date ranges without an `@` window use `hours` for
/// every day of the span.
pub fn parse_recurrence(s: &str, hours: Hours) -> Result<RecurrenceSpec> {
    let s = s.trim();
    let (kind, rest) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("recurrence '{s}' needs a kind prefix like 'weekly:'"))?;

    let spec = match kind.to_ascii_lowercase().as_str() {
        "single" => RecurrenceSpec::Single { date: parse_date(rest)? },
        "fixed" => {
            let re = Regex::new(r"^(\d{1,2})-(\d{1,2})$")?;
            let caps = re.captures(rest).ok_or_else(|| anyhow!("fixed date must be MM-DD, got '{rest}'"))?;
            RecurrenceSpec::FixedDate {
                month: caps[1].parse()?,
                day: caps[2].parse()?,
            }
        }
        "nth" => {
            let re = Regex::new(r"^(\d{1,2}):([a-zA-Z]+):(\d|last)$")?;
            let caps = re
                .captures(rest)
                .ok_or_else(|| anyhow!("nth weekday must be MONTH:DAY:N|last, got '{rest}'"))?;
            let occurrence = match &caps[3] {
                "last" => -1,
                n => n.parse()?,
            };
            RecurrenceSpec::NthWeekday {
                month: caps[1].parse()?,
                weekday: parse_weekday(&caps[2])?,
                occurrence,
            }
        }
        "weekly" => RecurrenceSpec::WeeklyDays {
            days: parse_weekdays(rest)?,
        },
        "range" => {
            let re = Regex::new(r"^(\d{4}-\d{2}-\d{2})\.\.(\d{4}-\d{2}-\d{2})(?:@(\d{1,2}:\d{2})-(\d{1,2}:\d{2}))?$")?;
            let caps = re
                .captures(rest)
                .ok_or_else(|| anyhow!("range must be START..END[@IN-OUT], got '{rest}'"))?;
            let start = parse_date(&caps[1])?;
            let end = parse_date(&caps[2])?;
            let range = match (caps.get(3), caps.get(4)) {
                (Some(check_in), Some(check_out)) => DateRange::check_in_out(
                    start,
                    end,
                    parse_hhmm(check_in.as_str())?,
                    parse_hhmm(check_out.as_str())?,
                ),
                _ => DateRange {
                    start,
                    end,
                    first_day: hours,
                    middle_days: hours,
                    last_day: hours,
                },
            };
            RecurrenceSpec::DateRangeDaily(range)
        }
        "every" => {
            let re = Regex::new(r"^(\d+)([dwDW]):(\d{4}-\d{2}-\d{2})$")?;
            let caps = re
                .captures(rest)
                .ok_or_else(|| anyhow!("interval must be N(d|w):ANCHOR, got '{rest}'"))?;
            let unit = match caps[2].to_ascii_lowercase().as_str() {
                "w" => IntervalUnit::Weeks,
                _ => IntervalUnit::Days,
            };
            RecurrenceSpec::Interval {
                every: caps[1].parse()?,
                unit,
                anchor: parse_date(&caps[3])?,
            }
        }
        other => bail!("unknown recurrence kind '{other}'"),
    };
    spec.validate()?;
    Ok(spec)
}

pub fn parse_fan(s: &str) -> Result<FanMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(FanMode::Auto),
        "on" => Ok(FanMode::On),
        "circulate" => Ok(FanMode::Circulate),
        other => bail!("unknown fan mode '{other}' (auto, on, circulate)"),
    }
}

pub fn parse_mode(s: &str) -> Result<HvacMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(HvacMode::Auto),
        "heat" => Ok(HvacMode::Heat),
        "cool" => Ok(HvacMode::Cool),
        "off" => Ok(HvacMode::Off),
        other => bail!("unknown hvac mode '{other}' (auto, heat, cool, off)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_nth_weekday_forms() {
        assert_eq!(
            parse_recurrence("nth:11:thu:4", Hours::closed()).unwrap(),
            RecurrenceSpec::NthWeekday {
                month: 11,
                weekday: Weekday::Thu,
                occurrence: 4
            }
        );
        assert_eq!(
            parse_recurrence("nth:5:mon:last", Hours::closed()).unwrap(),
            RecurrenceSpec::NthWeekday {
                month: 5,
                weekday: Weekday::Mon,
                occurrence: -1
            }
        );
        assert!(parse_recurrence("nth:5:mon:7", Hours::closed()).is_err());
    }

    #[test]
    fn test_parse_range_with_check_in_out() {
        let spec = parse_recurrence("range:2024-12-24..2024-12-26@15:00-11:00", Hours::closed()).unwrap();
        let RecurrenceSpec::DateRangeDaily(range) = spec else {
            panic!("expected a date range");
        };
        assert_eq!((range.start, range.end), (d(2024, 12, 24), d(2024, 12, 26)));
        assert_eq!(range.first_day.open, Some(t(15, 0)));
        assert_eq!(range.last_day.close, Some(t(11, 0)));
    }

    #[test]
    fn test_parse_range_without_window_uses_rule_hours() {
        let hours = Hours::open(t(9, 0), t(12, 0));
        let RecurrenceSpec::DateRangeDaily(range) = parse_recurrence("range:2024-08-01..2024-08-03", hours).unwrap()
        else {
            panic!("expected a date range");
        };
        assert_eq!(range.middle_days, hours);
        assert_eq!(range.last_day, hours);
    }

    #[test]
    fn test_parse_interval_and_fixed() {
        assert_eq!(
            parse_recurrence("every:2w:2024-01-05", Hours::closed()).unwrap(),
            RecurrenceSpec::Interval {
                every: 2,
                unit: IntervalUnit::Weeks,
                anchor: d(2024, 1, 5)
            }
        );
        assert_eq!(
            parse_recurrence("fixed:12-25", Hours::closed()).unwrap(),
            RecurrenceSpec::FixedDate { month: 12, day: 25 }
        );
        assert!(parse_recurrence("every:0d:2024-01-01", Hours::closed()).is_err());
        assert!(parse_recurrence("monthly:3", Hours::closed()).is_err());
    }

    #[test]
    fn test_parse_weekdays_ranges_and_lists() {
        assert_eq!(parse_weekdays("sat,sun").unwrap(), vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(parse_weekdays("mon-wed,fri").unwrap().len(), 4);
        assert!(parse_weekdays("fri-mon").is_err());
    }

    #[test]
    fn test_parse_weekly_hours() {
        let w = parse_weekly_hours("mon-fri 08:00-18:00; sat 10:00-14:00; sun closed").unwrap();
        assert_eq!(w.get(Weekday::Wed), Hours::open(t(8, 0), t(18, 0)));
        assert_eq!(w.get(Weekday::Sat), Hours::open(t(10, 0), t(14, 0)));
        assert!(w.get(Weekday::Sun).closed);
        assert!(parse_weekly_hours("mon-fri 18:00-08:00").is_err());
    }

    #[test]
    fn test_hours_flags() {
        assert!(hours_from_flags(true, None, None).unwrap().closed);
        assert!(hours_from_flags(true, Some("08:00"), None).is_err());
        assert!(hours_from_flags(false, Some("08:00"), None).is_err());
        assert_eq!(
            hours_from_flags(false, Some("08:00"), Some("12:30")).unwrap(),
            Hours::open(t(8, 0), t(12, 30))
        );
    }
}
