//! Rule mutations under the forward-only policy.
//!
//! Nothing here may change what a date strictly before today resolves to.
//! Deletes retire or cap a rule instead of removing it, and edits to a rule
//! with history split it into a capped original and a successor.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::changelog::{self, ChangeAction, ChangeLogEntry};
use crate::error::{ScheduleError, ScheduleResult};
use crate::recurrence::{bounded_years, expand, expand_between};
use crate::rule::{NewRule, RecurrenceSpec, RuleEdit, ScheduleRule};
use crate::store::{ChangeLog, LedgerStore, RuleStore, SiteStore};
use crate::time::{LocalToday, year_end};

/// How far past today's year a delete counts projected occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionHorizon {
    pub years_ahead: u32,
}

impl Default for ProjectionHorizon {
    fn default() -> Self {
        Self { years_ahead: 1 }
    }
}

impl ProjectionHorizon {
    fn end(self, today: LocalToday) -> NaiveDate {
        let ahead = i32::try_from(self.years_ahead).unwrap_or(i32::MAX);
        let year = today.date().year().saturating_add(ahead);
        year_end(year).unwrap_or(NaiveDate::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeleteClass {
    FullDelete,
    /// Keep everything up to and including `cap_date`.
    PartialDelete { cap_date: NaiveDate },
    RuleNotFound,
}

/// Classify a delete request without touching storage.
///
/// One-off rules and requests without `from_date` delete fully; a recurring
/// rule with `from_date` is capped the day before.
pub fn classify_delete(rule: Option<&ScheduleRule>, from_date: Option<NaiveDate>) -> DeleteClass {
    let Some(rule) = rule else {
        return DeleteClass::RuleNotFound;
    };
    match from_date {
        Some(from) if rule.is_recurring() => DeleteClass::PartialDelete {
            cap_date: from - Duration::days(1),
        },
        _ => DeleteClass::FullDelete,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub class: DeleteClass,
    /// Ledger entries dropped plus projected dates within the horizon.
    pub removed: usize,
    pub retired: bool,
    pub rule: ScheduleRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOutcome {
    /// The rule now carrying the edited definition.
    pub rule: ScheduleRule,
    /// Original rule capped at yesterday, when the edit had to split.
    pub superseded: Option<ScheduleRule>,
    /// Future manual overrides dropped from the original rule.
    pub dropped_overrides: usize,
}

/// Validate and store a new rule.
pub fn create_rule<S>(store: &S, new: NewRule, today: LocalToday, actor: &str) -> ScheduleResult<ScheduleRule>
where
    S: SiteStore + RuleStore + ChangeLog + ?Sized,
{
    if store.site(&new.site_id)?.is_none() {
        return Err(ScheduleError::not_found("site", &new.site_id));
    }

    let effective_from = match &new.recurrence {
        RecurrenceSpec::Single { date } => *date,
        _ => new.effective_from.unwrap_or(today.date()),
    };

    let rule = ScheduleRule {
        id: Uuid::new_v4().to_string(),
        site_id: new.site_id,
        name: new.name.trim().to_string(),
        hours: new.hours,
        recurrence: new.recurrence,
        effective_from,
        effective_to: None,
        retired: false,
        supersedes: None,
        created_at: today.as_of(),
    };
    rule.validate()?;
    if today.is_past(rule.effective_from) {
        return Err(ScheduleError::ForwardOnly {
            rule_id: rule.id,
            date: effective_from,
        });
    }

    store.insert_rule(rule.clone())?;
    info!(rule_id = %rule.id, site_id = %rule.site_id, kind = rule.recurrence.kind(), "rule created");
    changelog::record(
        store,
        ChangeLogEntry::new(today.as_of(), actor, &rule.site_id, &rule.id, ChangeAction::Created)
            .with_range(Some(rule.effective_from), None),
    );
    Ok(rule)
}

/// Full or partial delete of a rule as classified by [`classify_delete`].
pub fn delete_rule<S>(
    store: &S,
    rule_id: &str,
    from_date: Option<NaiveDate>,
    today: LocalToday,
    horizon: ProjectionHorizon,
    actor: &str,
) -> ScheduleResult<DeleteOutcome>
where
    S: RuleStore + LedgerStore + ChangeLog + ?Sized,
{
    let existing = store.rule(rule_id)?;
    let class = classify_delete(existing.as_ref(), from_date);
    let Some(mut rule) = existing else {
        return Err(ScheduleError::not_found("rule", rule_id));
    };

    let outcome = match class {
        DeleteClass::RuleNotFound => return Err(ScheduleError::not_found("rule", rule_id)),
        DeleteClass::FullDelete => {
            let removed = if rule.retired {
                0
            } else {
                remove_from(store, &rule, today.date(), today, horizon)?
            };
            // history up to yesterday stays resolvable
            let yesterday = today.yesterday();
            if yesterday >= rule.effective_from {
                rule.effective_to = Some(rule.effective_to.map_or(yesterday, |to| to.min(yesterday)));
            }
            rule.retired = true;
            store.update_rule(&rule)?;
            DeleteOutcome {
                class,
                removed,
                retired: true,
                rule,
            }
        }
        DeleteClass::PartialDelete { cap_date } => {
            let from = cap_date + Duration::days(1);
            if today.is_past(from) {
                return Err(ScheduleError::ForwardOnly {
                    rule_id: rule.id,
                    date: from,
                });
            }
            let removed = if rule.retired {
                0
            } else {
                remove_from(store, &rule, from, today, horizon)?
            };
            rule.effective_to = Some(rule.effective_to.map_or(cap_date, |to| to.min(cap_date)));
            if !rule.retired && !has_remaining(store, &rule)? {
                rule.retired = true;
            }
            store.update_rule(&rule)?;
            DeleteOutcome {
                class,
                removed,
                retired: rule.retired,
                rule,
            }
        }
    };

    info!(
        rule_id = %outcome.rule.id,
        class = ?outcome.class,
        removed = outcome.removed,
        retired = outcome.retired,
        "rule deleted"
    );
    let action = match outcome.class {
        DeleteClass::PartialDelete { .. } => ChangeAction::PartialDelete,
        _ => ChangeAction::FullDelete,
    };
    changelog::record(
        store,
        ChangeLogEntry::new(today.as_of(), actor, &outcome.rule.site_id, &outcome.rule.id, action)
            .with_range(Some(from_date.unwrap_or(today.date())), None)
            .with_removed(outcome.removed),
    );
    Ok(outcome)
}

/// Drop ledger entries on or after `from` and count them together with the
/// live dates the rule would still have produced up to the horizon.
fn remove_from<S>(
    store: &S,
    rule: &ScheduleRule,
    from: NaiveDate,
    today: LocalToday,
    horizon: ProjectionHorizon,
) -> ScheduleResult<usize>
where
    S: LedgerStore + ?Sized,
{
    let from = from.max(rule.effective_from);
    let mut to = horizon.end(today);
    if let Some(cap) = rule.effective_to {
        to = to.min(cap);
    }
    if let Some((_, last_year)) = bounded_years(&rule.recurrence) {
        // finite rules are counted in full, even past the horizon
        to = rule
            .effective_to
            .unwrap_or(NaiveDate::MAX)
            .min(year_end(last_year).unwrap_or(to));
    }

    let mut dates: Vec<NaiveDate> = if from <= to {
        expand_between(&rule.recurrence, from, to)
            .into_iter()
            .map(|p| p.date)
            .collect()
    } else {
        vec![]
    };
    let stored = store.entries_for_rule(&rule.id, from, NaiveDate::MAX)?;
    dates.extend(stored.iter().map(|e| e.date()));
    dates.sort();
    dates.dedup();

    store.remove_from(&rule.id, from)?;
    Ok(dates.len())
}

/// Whether the rule has a ledger entry or a projected date in `[from, to]`.
fn occurs_within<S>(store: &S, rule: &ScheduleRule, from: NaiveDate, to: NaiveDate) -> ScheduleResult<bool>
where
    S: LedgerStore + ?Sized,
{
    if to < from {
        return Ok(false);
    }
    if !store.entries_for_rule(&rule.id, from, to)?.is_empty() {
        return Ok(true);
    }
    Ok((from.year()..=to.year()).any(|year| {
        expand(&rule.recurrence, year)
            .iter()
            .any(|p| p.date >= from && p.date <= to)
    }))
}

/// Whether a capped rule still has anything inside its window.
fn has_remaining<S>(store: &S, rule: &ScheduleRule) -> ScheduleResult<bool>
where
    S: LedgerStore + ?Sized,
{
    match rule.effective_to {
        Some(to) => occurs_within(store, rule, rule.effective_from, to),
        None => Ok(true),
    }
}

/// Whether the rule has produced anything strictly before today.
fn has_history<S>(store: &S, rule: &ScheduleRule, today: LocalToday) -> ScheduleResult<bool>
where
    S: LedgerStore + ?Sized,
{
    let yesterday = today.yesterday();
    let to = rule.effective_to.map_or(yesterday, |t| t.min(yesterday));
    occurs_within(store, rule, rule.effective_from, to)
}

/// Apply an edit from today forward.
///
/// A rule with no history is edited in place. Otherwise the original is
/// capped at yesterday and a successor starting today carries the edit.
pub fn edit_rule<S>(store: &S, rule_id: &str, edit: RuleEdit, today: LocalToday, actor: &str) -> ScheduleResult<EditOutcome>
where
    S: RuleStore + LedgerStore + ChangeLog + ?Sized,
{
    let original = store
        .rule(rule_id)?
        .ok_or_else(|| ScheduleError::not_found("rule", rule_id))?;
    if original.retired {
        return Err(ScheduleError::validation("rule_id", format!("rule {rule_id} is retired")));
    }
    if edit.is_empty() {
        return Err(ScheduleError::validation("edit", "nothing to change"));
    }
    if let RecurrenceSpec::Single { date } = original.recurrence {
        if today.is_past(date) {
            return Err(ScheduleError::ForwardOnly {
                rule_id: original.id,
                date,
            });
        }
    }

    let mut edited = original.clone();
    edit.apply_to(&mut edited);
    edited.name = edited.name.trim().to_string();
    edited.effective_from = match &edited.recurrence {
        RecurrenceSpec::Single { date } => *date,
        _ => original.effective_from.max(today.date()),
    };
    if today.is_past(edited.effective_from) {
        return Err(ScheduleError::ForwardOnly {
            rule_id: original.id,
            date: edited.effective_from,
        });
    }
    edited.validate()?;

    if !has_history(store, &original, today)? {
        // overrides belong to dates of the old recurrence
        let dropped_overrides = if edited.recurrence != original.recurrence {
            store.remove_from(&edited.id, today.date())?
        } else {
            0
        };
        store.update_rule(&edited)?;
        info!(rule_id = %edited.id, dropped_overrides, "rule edited in place");
        changelog::record(
            store,
            ChangeLogEntry::new(today.as_of(), actor, &edited.site_id, &edited.id, ChangeAction::Edited)
                .with_range(Some(edited.effective_from), edited.effective_to)
                .with_removed(dropped_overrides),
        );
        return Ok(EditOutcome {
            rule: edited,
            superseded: None,
            dropped_overrides,
        });
    }

    let mut capped = original.clone();
    let yesterday = today.yesterday();
    capped.effective_to = Some(capped.effective_to.map_or(yesterday, |t| t.min(yesterday)));
    let dropped_overrides = store.remove_from(&capped.id, today.date())?;
    store.update_rule(&capped)?;

    let successor = ScheduleRule {
        id: Uuid::new_v4().to_string(),
        supersedes: Some(original.id.clone()),
        created_at: today.as_of(),
        ..edited
    };
    store.insert_rule(successor.clone())?;

    info!(
        rule_id = %capped.id,
        successor = %successor.id,
        dropped_overrides,
        "rule split for forward-only edit"
    );
    changelog::record(
        store,
        ChangeLogEntry::new(today.as_of(), actor, &capped.site_id, &capped.id, ChangeAction::Superseded)
            .with_range(Some(today.date()), successor.effective_to)
            .with_removed(dropped_overrides)
            .with_note(format!("continued by {}", successor.id)),
    );
    changelog::record(
        store,
        ChangeLogEntry::new(today.as_of(), actor, &successor.site_id, &successor.id, ChangeAction::Created)
            .with_range(Some(successor.effective_from), successor.effective_to)
            .with_note(format!("supersedes {}", capped.id)),
    );

    Ok(EditOutcome {
        rule: successor,
        superseded: Some(capped),
        dropped_overrides,
    })
}
