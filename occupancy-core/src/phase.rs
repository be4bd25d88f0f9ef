//! Occupancy phase: is the site open right now?
//!
//! The UTC instant is first moved onto the site's wall clock. A date near
//! UTC midnight belongs to whatever day it is locally, not in UTC.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ScheduleError, ScheduleResult};
use crate::hours::{Hours, WeeklyHours};
use crate::ledger::{Occurrence, occurrences_on};
use crate::rule::{RuleId, SpanPosition};
use crate::store::{LedgerStore, RuleStore, SiteStore};
use crate::time::{LocalInstant, LocalToday};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Occupied,
    Unoccupied,
}

/// Where the hours behind a decision came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HoursSource {
    BaseWeek,
    Exception {
        rule_id: RuleId,
        name: String,
        span: Option<SpanPosition>,
        is_override: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDecision {
    pub phase: Phase,
    pub local_date: NaiveDate,
    pub local_time: NaiveTime,
    /// The effective window the decision was made against.
    pub hours: Hours,
    pub source: HoursSource,
}

/// Pick the exception that governs a date when several rules land on it:
/// manual overrides first, then closures, then the oldest rule.
fn governing(occurrences: &[Occurrence]) -> Option<&Occurrence> {
    occurrences
        .iter()
        .enumerate()
        .min_by_key(|(i, o)| (!o.is_override, !o.hours.closed, *i))
        .map(|(_, o)| o)
}

/// Decide the phase from already-loaded inputs. An exception on the local
/// date replaces the base hours for that day outright.
pub fn decide(weekly: &WeeklyHours, occurrences: &[Occurrence], local: LocalInstant) -> PhaseDecision {
    let (hours, source) = match governing(occurrences) {
        Some(o) => (
            o.hours,
            HoursSource::Exception {
                rule_id: o.rule_id.clone(),
                name: o.name.clone(),
                span: o.span,
                is_override: o.is_override,
            },
        ),
        None => (weekly.get(local.weekday()), HoursSource::BaseWeek),
    };

    if hours.is_incomplete() {
        warn!(date = %local.date, ?source, "open hours without both open and close time; treating as unoccupied");
    }

    let phase = if hours.contains(local.time) {
        Phase::Occupied
    } else {
        Phase::Unoccupied
    };

    PhaseDecision {
        phase,
        local_date: local.date,
        local_time: local.time,
        hours,
        source,
    }
}

/// Current phase of a site at `now_utc`.
pub fn current_phase<S>(store: &S, site_id: &str, now_utc: DateTime<Utc>) -> ScheduleResult<PhaseDecision>
where
    S: SiteStore + RuleStore + LedgerStore + ?Sized,
{
    phase_at(store, site_id, now_utc, now_utc)
}

/// Phase of a site at `at_utc` as seen from `now_utc`.
///
/// Today is taken from `now_utc`, so an instant on an earlier local date
/// resolves against the frozen ledger rather than the rules as they are now.
pub fn phase_at<S>(
    store: &S,
    site_id: &str,
    at_utc: DateTime<Utc>,
    now_utc: DateTime<Utc>,
) -> ScheduleResult<PhaseDecision>
where
    S: SiteStore + RuleStore + LedgerStore + ?Sized,
{
    let site = store
        .site(site_id)?
        .ok_or_else(|| ScheduleError::not_found("site", site_id))?;
    let tz = site.tz()?;
    let local = LocalInstant::from_utc(at_utc, tz);
    let today = LocalToday::from_utc(now_utc, tz);

    let occurrences = occurrences_on(store, site_id, local.date, today)?;
    Ok(decide(&site.weekly_hours, &occurrences, local))
}
