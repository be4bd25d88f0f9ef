//! Occurrence ledger: concrete per-date projections of a site's rules.
//!
//! Future dates are computed from the live rule on every call and never
//! stored. The first time a past date is requested it is frozen into the
//! ledger from the rule as it exists then, and that entry is returned
//! verbatim from then on, so later rule edits never rewrite history.
//! Manual overrides are ledger entries too and win over both.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::changelog::{self, ChangeAction, ChangeLogEntry};
use crate::error::{ScheduleError, ScheduleResult};
use crate::hours::Hours;
use crate::recurrence::{ProjectedDate, expand, expand_between};
use crate::rule::{RuleId, ScheduleRule, SpanPosition};
use crate::store::{ChangeLog, LedgerStore, RuleStore, SiteStore};
use crate::time::LocalToday;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceOrigin {
    /// Computed from the current rule definition; not persisted.
    Live,
    /// Materialized once from the rule and immutable since.
    Frozen,
    /// Manual correction for this date.
    Override,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub rule_id: RuleId,
    pub site_id: String,
    pub date: NaiveDate,
    pub name: String,
    pub hours: Hours,
    pub span: Option<SpanPosition>,
    pub origin: OccurrenceOrigin,
    pub is_override: bool,
}

impl Occurrence {
    fn project(rule: &ScheduleRule, projected: &ProjectedDate, origin: OccurrenceOrigin) -> Self {
        let (hours, span) = match projected.span {
            Some(s) => (s.hours, Some(s.position)),
            None => rule.hours_on(projected.date),
        };
        Self {
            rule_id: rule.id.clone(),
            site_id: rule.site_id.clone(),
            date: projected.date,
            name: rule.name.clone(),
            hours,
            span,
            origin,
            is_override: origin == OccurrenceOrigin::Override,
        }
    }
}

/// A frozen or overridden occurrence, keyed by (rule id, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub occurrence: Occurrence,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn rule_id(&self) -> &str {
        &self.occurrence.rule_id
    }

    pub fn date(&self) -> NaiveDate {
        self.occurrence.date
    }

    pub fn is_override(&self) -> bool {
        self.occurrence.is_override
    }
}

/// Inclusive calendar range for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> ScheduleResult<Self> {
        if to < from {
            return Err(ScheduleError::validation("to", format!("{to} is before from {from}")));
        }
        Ok(Self { from, to })
    }

    pub fn day(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    /// Jan 1 of today's year through Dec 31 of the next year.
    pub fn default_for(today: LocalToday) -> Self {
        let year = today.date().year();
        Self {
            from: NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(today.date()),
            to: NaiveDate::from_ymd_opt(year + 1, 12, 31).unwrap_or(today.date()),
        }
    }

    /// Intersection with a rule's effective window.
    fn clip(&self, rule: &ScheduleRule) -> Option<(NaiveDate, NaiveDate)> {
        let from = self.from.max(rule.effective_from);
        let to = rule.effective_to.map_or(self.to, |t| t.min(self.to));
        (from <= to).then_some((from, to))
    }
}

/// Resolve every occurrence of the site's rules inside `window`, ordered by
/// date and then by rule creation order.
///
/// Past dates without a ledger entry are frozen here. Retired rules keep
/// resolving dates before today but never project forward.
pub fn resolve<S>(store: &S, site_id: &str, window: DateWindow, today: LocalToday) -> ScheduleResult<Vec<Occurrence>>
where
    S: SiteStore + RuleStore + LedgerStore + ?Sized,
{
    if store.site(site_id)?.is_none() {
        return Err(ScheduleError::not_found("site", site_id));
    }

    let rules = store.rules_for_site(site_id)?;
    let mut out: Vec<(usize, Occurrence)> = Vec::new();

    for (order, rule) in rules.iter().enumerate() {
        for occ in resolve_rule(store, rule, window, today)? {
            out.push((order, occ));
        }
    }

    out.sort_by(|(oa, a), (ob, b)| a.date.cmp(&b.date).then(oa.cmp(ob)));
    Ok(out.into_iter().map(|(_, o)| o).collect())
}

/// Occurrences of one rule inside `window`, clipped to its effective window.
pub fn resolve_rule<S>(
    store: &S,
    rule: &ScheduleRule,
    window: DateWindow,
    today: LocalToday,
) -> ScheduleResult<Vec<Occurrence>>
where
    S: LedgerStore + ?Sized,
{
    let Some((from, to)) = window.clip(rule) else {
        return Ok(vec![]);
    };

    let mut entries: BTreeMap<NaiveDate, LedgerEntry> = store
        .entries_for_rule(&rule.id, from, to)?
        .into_iter()
        .map(|e| (e.date(), e))
        .collect();

    let mut out = Vec::new();

    for projected in expand_between(&rule.recurrence, from, to) {
        if let Some(entry) = entries.remove(&projected.date) {
            out.push(entry.occurrence);
        } else if today.is_past(projected.date) {
            out.push(freeze(store, rule, &projected, today)?.occurrence);
        } else if !rule.retired {
            out.push(Occurrence::project(rule, &projected, OccurrenceOrigin::Live));
        }
    }

    // Entries whose date the current definition no longer produces.
    out.extend(entries.into_values().map(|e| e.occurrence));
    out.sort_by_key(|o| o.date);
    Ok(out)
}

/// One-time materialization of a past date. Concurrent callers converge on
/// whichever entry the store accepted first.
fn freeze<S>(store: &S, rule: &ScheduleRule, projected: &ProjectedDate, today: LocalToday) -> ScheduleResult<LedgerEntry>
where
    S: LedgerStore + ?Sized,
{
    let candidate = LedgerEntry {
        occurrence: Occurrence::project(rule, projected, OccurrenceOrigin::Frozen),
        recorded_at: today.as_of(),
    };
    let stored = store.insert_if_absent(candidate.clone())?;
    if stored == candidate {
        debug!(rule_id = %rule.id, date = %projected.date, "froze past occurrence");
    } else {
        debug!(rule_id = %rule.id, date = %projected.date, "occurrence already frozen by another writer");
    }
    Ok(stored)
}

/// Occurrences on a single local date.
pub fn occurrences_on<S>(store: &S, site_id: &str, date: NaiveDate, today: LocalToday) -> ScheduleResult<Vec<Occurrence>>
where
    S: SiteStore + RuleStore + LedgerStore + ?Sized,
{
    resolve(store, site_id, DateWindow::day(date), today)
}

/// Replace the hours of one projected date with a manual correction.
///
/// Allowed for past and future dates alike; the date must be one the rule
/// produces inside its effective window.
pub fn override_occurrence<S>(
    store: &S,
    rule_id: &str,
    date: NaiveDate,
    hours: Hours,
    today: LocalToday,
    actor: &str,
) -> ScheduleResult<Occurrence>
where
    S: RuleStore + LedgerStore + ChangeLog + ?Sized,
{
    let rule = store
        .rule(rule_id)?
        .ok_or_else(|| ScheduleError::not_found("rule", rule_id))?;
    if rule.retired {
        return Err(ScheduleError::validation("rule_id", format!("rule {rule_id} is retired")));
    }
    hours.validate()?;

    let projected = expand(&rule.recurrence, date.year())
        .into_iter()
        .find(|p| p.date == date)
        .filter(|p| rule.in_window(p.date))
        .ok_or_else(|| ScheduleError::validation("date", format!("rule {rule_id} does not occur on {date}")))?;

    let mut occurrence = Occurrence::project(&rule, &projected, OccurrenceOrigin::Override);
    occurrence.hours = hours;
    store.upsert_override(LedgerEntry {
        occurrence: occurrence.clone(),
        recorded_at: today.as_of(),
    })?;

    info!(rule_id = %rule.id, %date, "occurrence overridden");
    changelog::record(
        store,
        ChangeLogEntry::new(today.as_of(), actor, &rule.site_id, &rule.id, ChangeAction::Override)
            .with_range(Some(date), Some(date)),
    );
    Ok(occurrence)
}
