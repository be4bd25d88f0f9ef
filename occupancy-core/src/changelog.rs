//! Append-only audit trail of rule mutations.
//!
//! Display-only from the engine's point of view: entries are written after a
//! mutation has committed and a failed write never undoes it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::rule::RuleId;
use crate::store::ChangeLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Edited,
    /// Forward-only edit that split the rule into a capped original and a successor.
    Superseded,
    Override,
    FullDelete,
    PartialDelete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub site_id: String,
    pub rule_id: RuleId,
    pub action: ChangeAction,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub removed_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ChangeLogEntry {
    pub fn new(
        at: DateTime<Utc>,
        actor: impl Into<String>,
        site_id: impl Into<String>,
        rule_id: impl Into<String>,
        action: ChangeAction,
    ) -> Self {
        Self {
            at,
            actor: actor.into(),
            site_id: site_id.into(),
            rule_id: rule_id.into(),
            action,
            from_date: None,
            to_date: None,
            removed_count: 0,
            note: None,
        }
    }

    pub fn with_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from_date = from;
        self.to_date = to;
        self
    }

    pub fn with_removed(mut self, removed_count: usize) -> Self {
        self.removed_count = removed_count;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Best-effort append.
pub fn record<L: ChangeLog + ?Sized>(log: &L, entry: ChangeLogEntry) {
    let rule_id = entry.rule_id.clone();
    let action = entry.action;
    if let Err(e) = log.append(entry) {
        warn!(rule_id = %rule_id, ?action, error = %e, "change log append failed");
    }
}
