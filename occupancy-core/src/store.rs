//! Durable-store seam and an in-memory implementation.
//!
//! The engine only needs keyed reads, whole-row writes and one atomic
//! ledger operation: insert-if-absent on (rule id, date). Everything is
//! `&self` + `Send + Sync` so a single store can back parallel requests.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::changelog::ChangeLogEntry;
use crate::ledger::LedgerEntry;
use crate::rule::{RuleId, ScheduleRule};
use crate::setpoints::{Profile, Zone};
use crate::site::Site;

pub trait SiteStore: Send + Sync {
    fn site(&self, id: &str) -> Result<Option<Site>>;
    fn sites(&self) -> Result<Vec<Site>>;
    fn put_site(&self, site: Site) -> Result<()>;
}

pub trait RuleStore: Send + Sync {
    fn rule(&self, id: &str) -> Result<Option<ScheduleRule>>;
    /// All rules of a site, retired included, oldest first.
    fn rules_for_site(&self, site_id: &str) -> Result<Vec<ScheduleRule>>;
    fn insert_rule(&self, rule: ScheduleRule) -> Result<()>;
    fn update_rule(&self, rule: &ScheduleRule) -> Result<()>;
}

pub trait LedgerStore: Send + Sync {
    fn entry(&self, rule_id: &str, date: NaiveDate) -> Result<Option<LedgerEntry>>;
    /// Entries of a rule with `from <= date <= to`, ordered by date.
    fn entries_for_rule(&self, rule_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<LedgerEntry>>;
    /// Store `entry` unless its key is taken; returns whichever entry is stored.
    fn insert_if_absent(&self, entry: LedgerEntry) -> Result<LedgerEntry>;
    /// Write a manual override, replacing any entry under the same key.
    fn upsert_override(&self, entry: LedgerEntry) -> Result<()>;
    /// Remove every entry of a rule dated on or after `from`; returns the count.
    fn remove_from(&self, rule_id: &str, from: NaiveDate) -> Result<usize>;
}

pub trait ChangeLog: Send + Sync {
    fn append(&self, entry: ChangeLogEntry) -> Result<()>;
    fn entries(&self, rule_id: Option<&str>) -> Result<Vec<ChangeLogEntry>>;
}

pub trait HvacStore: Send + Sync {
    fn zone(&self, id: &str) -> Result<Option<Zone>>;
    fn zones_for_site(&self, site_id: &str) -> Result<Vec<Zone>>;
    fn zones_for_profile(&self, profile_id: &str) -> Result<Vec<Zone>>;
    fn put_zone(&self, zone: Zone) -> Result<()>;
    fn profile(&self, id: &str) -> Result<Option<Profile>>;
    fn profiles(&self) -> Result<Vec<Profile>>;
    fn put_profile(&self, profile: Profile) -> Result<()>;
}

/// Everything the engine persists.
pub trait Store: SiteStore + RuleStore + LedgerStore + ChangeLog + HvacStore {}

impl<T: SiteStore + RuleStore + LedgerStore + ChangeLog + HvacStore> Store for T {}

/// Serializable image of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub sites: BTreeMap<String, Site>,
    #[serde(default)]
    pub rules: BTreeMap<RuleId, ScheduleRule>,
    #[serde(default)]
    pub ledger: BTreeMap<RuleId, BTreeMap<NaiveDate, LedgerEntry>>,
    #[serde(default)]
    pub changes: Vec<ChangeLogEntry>,
    #[serde(default)]
    pub zones: BTreeMap<String, Zone>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().clone()
    }

    pub fn ledger_len(&self) -> usize {
        self.inner.read().ledger.values().map(BTreeMap::len).sum()
    }
}

impl SiteStore for MemoryStore {
    fn site(&self, id: &str) -> Result<Option<Site>> {
        Ok(self.inner.read().sites.get(id).cloned())
    }

    fn sites(&self) -> Result<Vec<Site>> {
        Ok(self.inner.read().sites.values().cloned().collect())
    }

    fn put_site(&self, site: Site) -> Result<()> {
        self.inner.write().sites.insert(site.id.clone(), site);
        Ok(())
    }
}

impl RuleStore for MemoryStore {
    fn rule(&self, id: &str) -> Result<Option<ScheduleRule>> {
        Ok(self.inner.read().rules.get(id).cloned())
    }

    fn rules_for_site(&self, site_id: &str) -> Result<Vec<ScheduleRule>> {
        let mut rules: Vec<ScheduleRule> = self
            .inner
            .read()
            .rules
            .values()
            .filter(|r| r.site_id == site_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rules)
    }

    fn insert_rule(&self, rule: ScheduleRule) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.rules.contains_key(&rule.id) {
            bail!("rule {} already exists", rule.id);
        }
        inner.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    fn update_rule(&self, rule: &ScheduleRule) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.rules.get_mut(&rule.id) {
            Some(slot) => {
                *slot = rule.clone();
                Ok(())
            }
            None => bail!("rule {} does not exist", rule.id),
        }
    }
}

impl LedgerStore for MemoryStore {
    fn entry(&self, rule_id: &str, date: NaiveDate) -> Result<Option<LedgerEntry>> {
        Ok(self
            .inner
            .read()
            .ledger
            .get(rule_id)
            .and_then(|by_date| by_date.get(&date))
            .cloned())
    }

    fn entries_for_rule(&self, rule_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<LedgerEntry>> {
        if to < from {
            return Ok(vec![]);
        }
        Ok(self
            .inner
            .read()
            .ledger
            .get(rule_id)
            .map(|by_date| by_date.range(from..=to).map(|(_, e)| e.clone()).collect())
            .unwrap_or_default())
    }

    fn insert_if_absent(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        // check and insert under one write lock
        let mut inner = self.inner.write();
        let stored = inner
            .ledger
            .entry(entry.rule_id().to_string())
            .or_default()
            .entry(entry.date())
            .or_insert(entry);
        Ok(stored.clone())
    }

    fn upsert_override(&self, entry: LedgerEntry) -> Result<()> {
        if !entry.is_override() {
            bail!(
                "upsert_override called with a non-override entry for {} on {}",
                entry.rule_id(),
                entry.date()
            );
        }
        self.inner
            .write()
            .ledger
            .entry(entry.rule_id().to_string())
            .or_default()
            .insert(entry.date(), entry);
        Ok(())
    }

    fn remove_from(&self, rule_id: &str, from: NaiveDate) -> Result<usize> {
        let mut inner = self.inner.write();
        let Some(by_date) = inner.ledger.get_mut(rule_id) else {
            return Ok(0);
        };
        let removed = by_date.split_off(&from).len();
        if by_date.is_empty() {
            inner.ledger.remove(rule_id);
        }
        Ok(removed)
    }
}

impl ChangeLog for MemoryStore {
    fn append(&self, entry: ChangeLogEntry) -> Result<()> {
        self.inner.write().changes.push(entry);
        Ok(())
    }

    fn entries(&self, rule_id: Option<&str>) -> Result<Vec<ChangeLogEntry>> {
        Ok(self
            .inner
            .read()
            .changes
            .iter()
            .filter(|e| rule_id.is_none_or(|id| e.rule_id == id))
            .cloned()
            .collect())
    }
}

impl HvacStore for MemoryStore {
    fn zone(&self, id: &str) -> Result<Option<Zone>> {
        Ok(self.inner.read().zones.get(id).cloned())
    }

    fn zones_for_site(&self, site_id: &str) -> Result<Vec<Zone>> {
        Ok(self
            .inner
            .read()
            .zones
            .values()
            .filter(|z| z.site_id == site_id)
            .cloned()
            .collect())
    }

    fn zones_for_profile(&self, profile_id: &str) -> Result<Vec<Zone>> {
        Ok(self
            .inner
            .read()
            .zones
            .values()
            .filter(|z| z.profile_id.as_deref() == Some(profile_id))
            .cloned()
            .collect())
    }

    fn put_zone(&self, zone: Zone) -> Result<()> {
        self.inner.write().zones.insert(zone.id.clone(), zone);
        Ok(())
    }

    fn profile(&self, id: &str) -> Result<Option<Profile>> {
        Ok(self.inner.read().profiles.get(id).cloned())
    }

    fn profiles(&self) -> Result<Vec<Profile>> {
        Ok(self.inner.read().profiles.values().cloned().collect())
    }

    fn put_profile(&self, profile: Profile) -> Result<()> {
        self.inner.write().profiles.insert(profile.id.clone(), profile);
        Ok(())
    }
}
