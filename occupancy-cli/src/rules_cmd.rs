use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use occupancy_core::{
    ChangeLog, DateWindow, HoursSource, LocalToday, NewRule, OccurrenceOrigin, ProjectionHorizon, RuleEdit,
    RuleStore, ScheduleError, Site, SiteStore, create_rule, delete_rule, edit_rule, override_occurrence,
    phase_at, resolve,
};

use crate::config::load_config;
use crate::spec_syntax::{hours_from_flags, parse_date, parse_recurrence, parse_weekly_hours};
use crate::state::FileStore;

#[derive(Subcommand, Debug)]
pub enum SiteCommand {
    /// Register a site with its timezone and base weekly hours
    Add {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        /// IANA timezone, e.g. America/Chicago
        #[arg(long)]
        tz: String,

        /// Base week, e.g. "mon-fri 08:00-18:00; sat closed"
        #[arg(long)]
        hours: Option<String>,
    },

    /// List known sites
    List,
}

#[derive(Subcommand, Debug)]
pub enum RuleCommand {
    /// Create an exception rule
    Create {
        #[arg(long)]
        site: String,

        #[arg(long)]
        name: String,

        #[arg(long, default_value_t = false)]
        closed: bool,

        #[arg(long)]
        open: Option<String>,

        #[arg(long)]
        close: Option<String>,

        /// Recurrence, e.g. nth:11:thu:4 or weekly:sat,sun
        #[arg(long)]
        spec: String,

        /// First date the rule applies (default: today)
        #[arg(long)]
        from: Option<String>,
    },

    /// List a site's rules, retired ones included
    List {
        #[arg(long)]
        site: String,
    },

    /// Change a rule from today forward
    Edit {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value_t = false)]
        closed: bool,

        #[arg(long)]
        open: Option<String>,

        #[arg(long)]
        close: Option<String>,

        #[arg(long)]
        spec: Option<String>,
    },

    /// Delete a rule fully, or from a date onward
    Delete {
        #[arg(long)]
        id: String,

        #[arg(long)]
        from: Option<String>,
    },

    /// Replace the hours of one occurrence
    Override {
        #[arg(long)]
        id: String,

        #[arg(long)]
        date: String,

        #[arg(long, default_value_t = false)]
        closed: bool,

        #[arg(long)]
        open: Option<String>,

        #[arg(long)]
        close: Option<String>,
    },

    /// Show the change log
    Log {
        #[arg(long)]
        rule: Option<String>,
    },
}

pub fn run_site(cmd: SiteCommand) -> Result<()> {
    let files = FileStore::open_default()?;
    let store = files.store();
    match cmd {
        SiteCommand::Add { id, name, tz, hours } => {
            let mut site = Site::new(id, name, tz);
            if let Some(h) = hours {
                site.weekly_hours = parse_weekly_hours(&h)?;
            }
            site.validate()?;
            store.put_site(site.clone())?;
            files.save()?;
            println!("Saved site {} ({}, {})", site.id, site.name, site.timezone);
        }
        SiteCommand::List => {
            for site in store.sites()? {
                println!("{}\t{}\t{}", site.id, site.name, site.timezone);
            }
        }
    }
    Ok(())
}

pub fn run_rule(cmd: RuleCommand) -> Result<()> {
    let cfg = load_config()?;
    let files = FileStore::open_default()?;
    let store = files.store();
    let now = Utc::now();
    let actor = cfg.engine.actor.as_str();

    match cmd {
        RuleCommand::Create {
            site,
            name,
            closed,
            open,
            close,
            spec,
            from,
        } => {
            let today = site_today(&files, &site, now)?;
            let hours = hours_from_flags(closed, open.as_deref(), close.as_deref())?;
            let new = NewRule {
                site_id: site,
                name,
                hours,
                recurrence: parse_recurrence(&spec, hours)?,
                effective_from: from.as_deref().map(parse_date).transpose()?,
            };
            let rule = create_rule(store, new, today, actor)?;
            files.save()?;
            println!("Created rule {} ({}) from {}", rule.id, rule.recurrence.kind(), rule.effective_from);
        }
        RuleCommand::List { site } => {
            for rule in store.rules_for_site(&site)? {
                let to = rule.effective_to.map(|d| d.to_string()).unwrap_or_else(|| "open".to_string());
                let state = if rule.retired { " [retired]" } else { "" };
                println!(
                    "{}\t{}\t{}\t{}..{}{}",
                    rule.id,
                    rule.name,
                    rule.recurrence.kind(),
                    rule.effective_from,
                    to,
                    state
                );
            }
        }
        RuleCommand::Edit {
            id,
            name,
            closed,
            open,
            close,
            spec,
        } => {
            let today = rule_today(&files, &id, now)?;
            let current = store.rule(&id)?.ok_or_else(|| ScheduleError::not_found("rule", &id))?;
            let hours = if closed || open.is_some() || close.is_some() {
                Some(hours_from_flags(closed, open.as_deref(), close.as_deref())?)
            } else {
                None
            };
            let recurrence = spec
                .as_deref()
                .map(|s| parse_recurrence(s, hours.unwrap_or(current.hours)))
                .transpose()?;
            let edit = RuleEdit {
                name,
                hours,
                recurrence,
            };
            let outcome = edit_rule(store, &id, edit, today, actor)?;
            files.save()?;
            match &outcome.superseded {
                Some(old) => println!(
                    "Rule {} capped at {}; continued by {} (dropped {} future overrides)",
                    old.id,
                    old.effective_to.map(|d| d.to_string()).unwrap_or_default(),
                    outcome.rule.id,
                    outcome.dropped_overrides
                ),
                None => println!(
                    "Rule {} edited in place (dropped {} future overrides)",
                    outcome.rule.id, outcome.dropped_overrides
                ),
            }
        }
        RuleCommand::Delete { id, from } => {
            let today = rule_today(&files, &id, now)?;
            let horizon = ProjectionHorizon {
                years_ahead: cfg.engine.horizon_years,
            };
            let from = from.as_deref().map(parse_date).transpose()?;
            let outcome = delete_rule(store, &id, from, today, horizon, actor)?;
            files.save()?;
            println!(
                "{:?}: removed {} occurrences{}",
                outcome.class,
                outcome.removed,
                if outcome.retired { ", rule retired" } else { "" }
            );
        }
        RuleCommand::Override {
            id,
            date,
            closed,
            open,
            close,
        } => {
            let today = rule_today(&files, &id, now)?;
            let hours = hours_from_flags(closed, open.as_deref(), close.as_deref())?;
            let occ = override_occurrence(store, &id, parse_date(&date)?, hours, today, actor)?;
            files.save()?;
            println!("Overrode {} on {}", occ.name, occ.date);
        }
        RuleCommand::Log { rule } => {
            for e in store.entries(rule.as_deref())? {
                println!(
                    "{} {} {:?} rule={} from={} to={} removed={}{}",
                    e.at.to_rfc3339(),
                    e.actor,
                    e.action,
                    e.rule_id,
                    e.from_date.map(|d| d.to_string()).unwrap_or_default(),
                    e.to_date.map(|d| d.to_string()).unwrap_or_default(),
                    e.removed_count,
                    e.note.map(|n| format!(" ({n})")).unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

pub fn occurrences(site: &str, from: Option<String>, to: Option<String>, json: bool) -> Result<()> {
    let files = FileStore::open_default()?;
    let store = files.store();
    let today = site_today(&files, site, Utc::now())?;

    let default = DateWindow::default_for(today);
    let from = from.as_deref().map(parse_date).transpose()?.unwrap_or(default.from);
    let to = to.as_deref().map(parse_date).transpose()?.unwrap_or(default.to);
    let window = DateWindow::new(from, to)?;

    let before = store.ledger_len();
    let listed = resolve(store, site, window, today)?;
    if store.ledger_len() != before {
        files.save()?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }
    for o in &listed {
        let hours = if o.hours.closed {
            "closed".to_string()
        } else {
            format!(
                "{}-{}",
                o.hours.open.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
                o.hours.close.map(|t| t.format("%H:%M").to_string()).unwrap_or_default()
            )
        };
        let origin = match o.origin {
            OccurrenceOrigin::Live => "",
            OccurrenceOrigin::Frozen => " [frozen]",
            OccurrenceOrigin::Override => " [override]",
        };
        println!("{} {:<12} {}{}", o.date, hours, o.name, origin);
    }
    Ok(())
}

pub fn phase(site: &str, at: Option<String>, json: bool) -> Result<()> {
    let files = FileStore::open_default()?;
    let store = files.store();
    let now = Utc::now();
    let at = match at {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .with_context(|| format!("'{s}' is not an RFC 3339 timestamp"))?
            .with_timezone(&Utc),
        None => now,
    };

    let before = store.ledger_len();
    let decision = phase_at(store, site, at, now)?;
    if store.ledger_len() != before {
        files.save()?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
        return Ok(());
    }
    let source = match &decision.source {
        HoursSource::BaseWeek => "base week".to_string(),
        HoursSource::Exception { name, is_override, .. } => {
            format!("{name}{}", if *is_override { " (override)" } else { "" })
        }
    };
    println!(
        "{:?} at {} {} local ({})",
        decision.phase,
        decision.local_date,
        decision.local_time.format("%H:%M"),
        source
    );
    Ok(())
}

fn site_today(files: &FileStore, site_id: &str, now: DateTime<Utc>) -> Result<LocalToday> {
    let site = files
        .store()
        .site(site_id)?
        .ok_or_else(|| ScheduleError::not_found("site", site_id))?;
    Ok(site.today(now)?)
}

fn rule_today(files: &FileStore, rule_id: &str, now: DateTime<Utc>) -> Result<LocalToday> {
    let rule = files
        .store()
        .rule(rule_id)?
        .ok_or_else(|| ScheduleError::not_found("rule", rule_id))?;
    site_today(files, &rule.site_id, now)
}

