use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use occupancy_core::{
    BatchReport, HvacSettings, HvacStore, Phase, Profile, ScheduleError, SiteStore, Zone, ZoneOutcome,
    apply_to_zone, resolve_zone_setpoints,
};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::load_config;
use crate::outbox::{OutboxSink, read_outbox};
use crate::spec_syntax::{parse_fan, parse_mode};
use crate::state::FileStore;

/// Setpoint fields shared by profiles and zones. Degrees F.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    #[arg(long)]
    occupied_heat: Option<f64>,

    #[arg(long)]
    occupied_cool: Option<f64>,

    #[arg(long)]
    unoccupied_heat: Option<f64>,

    #[arg(long)]
    unoccupied_cool: Option<f64>,

    /// auto | on | circulate
    #[arg(long)]
    occupied_fan: Option<String>,

    #[arg(long)]
    unoccupied_fan: Option<String>,

    /// auto | heat | cool | off
    #[arg(long)]
    mode: Option<String>,

    #[arg(long)]
    guardrail_min: Option<f64>,

    #[arg(long)]
    guardrail_max: Option<f64>,

    #[arg(long)]
    offset_up: Option<f64>,

    #[arg(long)]
    offset_down: Option<f64>,

    #[arg(long)]
    offset_minutes: Option<u32>,
}

impl SettingsArgs {
    fn into_settings(self) -> Result<HvacSettings> {
        let settings = HvacSettings {
            occupied_heat: self.occupied_heat,
            occupied_cool: self.occupied_cool,
            unoccupied_heat: self.unoccupied_heat,
            unoccupied_cool: self.unoccupied_cool,
            occupied_fan: self.occupied_fan.as_deref().map(parse_fan).transpose()?,
            unoccupied_fan: self.unoccupied_fan.as_deref().map(parse_fan).transpose()?,
            mode: self.mode.as_deref().map(parse_mode).transpose()?,
            guardrail_min: self.guardrail_min,
            guardrail_max: self.guardrail_max,
            manager_offset_up: self.offset_up,
            manager_offset_down: self.offset_down,
            manager_offset_minutes: self.offset_minutes,
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Create or replace a setpoint profile
    Add {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// List profiles
    List,
}

#[derive(Subcommand, Debug)]
pub enum ZoneCommand {
    /// Create or replace a zone
    Add {
        #[arg(long)]
        id: String,

        #[arg(long)]
        site: String,

        /// Display name (default: the id)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        profile: Option<String>,

        /// Own setpoints win over the linked profile
        #[arg(long = "override", default_value_t = false)]
        is_override: bool,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// List zones of a site
    List {
        #[arg(long)]
        site: String,
    },
}

pub fn run_profile(cmd: ProfileCommand) -> Result<()> {
    let files = FileStore::open_default()?;
    let store = files.store();
    match cmd {
        ProfileCommand::Add { id, name, settings } => {
            let profile = Profile {
                id,
                name,
                settings: settings.into_settings()?,
            };
            store.put_profile(profile.clone())?;
            files.save()?;
            println!("Saved profile {} ({})", profile.id, profile.name);
        }
        ProfileCommand::List => {
            for p in store.profiles()? {
                let zones = store.zones_for_profile(&p.id)?.len();
                println!("{}\t{}\t{} zones", p.id, p.name, zones);
            }
        }
    }
    Ok(())
}

pub fn run_zone(cmd: ZoneCommand) -> Result<()> {
    let files = FileStore::open_default()?;
    let store = files.store();
    match cmd {
        ZoneCommand::Add {
            id,
            site,
            name,
            profile,
            is_override,
            settings,
        } => {
            if store.site(&site)?.is_none() {
                return Err(ScheduleError::not_found("site", &site).into());
            }
            if let Some(p) = profile.as_deref() {
                if store.profile(p)?.is_none() {
                    return Err(ScheduleError::not_found("profile", p).into());
                }
            }
            let settings = settings.into_settings()?;
            if is_override && !settings.has_setpoints() {
                bail!("--override needs at least one heat or cool setpoint");
            }
            let mut zone = Zone::new(&id, site, name.unwrap_or_else(|| id.clone())).with_settings(settings);
            zone.profile_id = profile;
            zone.is_override = is_override;
            store.put_zone(zone.clone())?;
            files.save()?;
            println!("Saved zone {} in site {}", zone.id, zone.site_id);
        }
        ZoneCommand::List { site } => {
            for z in store.zones_for_site(&site)? {
                let link = z.profile_id.as_deref().unwrap_or("-");
                let mark = if z.is_override { " [override]" } else { "" };
                println!("{}\t{}\tprofile={}{}", z.id, z.name, link, mark);
            }
        }
    }
    Ok(())
}

pub fn setpoints(zone_id: &str, phase: Option<String>, json: bool) -> Result<()> {
    let files = FileStore::open_default()?;
    let resolved = resolve_zone_setpoints(files.store(), zone_id)?;

    let phase = match phase.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => None,
        Some("occupied") => Some(Phase::Occupied),
        Some("unoccupied") => Some(Phase::Unoccupied),
        Some(other) => bail!("unknown phase '{other}' (occupied, unoccupied)"),
    };

    match (phase, json) {
        (Some(p), true) => println!("{}", serde_json::to_string_pretty(&resolved.for_phase(p))?),
        (None, true) => println!("{}", serde_json::to_string_pretty(&resolved)?),
        (Some(p), false) => {
            let sp = resolved.for_phase(p);
            println!(
                "{:?}: heat {:.1} cool {:.1} fan {:?} mode {:?} (manager range {:.1}..{:.1})",
                sp.phase, sp.heat, sp.cool, sp.fan, sp.mode, sp.min_allowed, sp.max_allowed
            );
        }
        (None, false) => {
            let from = resolved.profile_name.as_deref().unwrap_or("");
            println!("source: {:?} {}", resolved.source, from);
            println!(
                "occupied   heat {:.1} cool {:.1} fan {:?}",
                resolved.occupied_heat, resolved.occupied_cool, resolved.occupied_fan
            );
            println!(
                "unoccupied heat {:.1} cool {:.1} fan {:?}",
                resolved.unoccupied_heat, resolved.unoccupied_cool, resolved.unoccupied_fan
            );
            println!(
                "mode {:?}, guardrails {:.1}..{:.1}, offsets +{:.1}/-{:.1} for {} min",
                resolved.mode,
                resolved.guardrail_min,
                resolved.guardrail_max,
                resolved.manager_offset_up,
                resolved.manager_offset_down,
                resolved.manager_offset_minutes
            );
        }
    }
    Ok(())
}

/// Resolve every zone linked to the profile and append each to the outbox,
/// one blocking task per zone.
pub async fn push_profile(profile_id: &str, json: bool) -> Result<()> {
    let cfg = load_config()?;
    let files = FileStore::open_default()?;
    let store = files.shared();

    let profile = store
        .profile(profile_id)?
        .ok_or_else(|| ScheduleError::not_found("profile", profile_id))?;
    let zones = store.zones_for_profile(profile_id)?;
    let zone_ids: Vec<String> = zones.iter().map(|z| z.id.clone()).collect();
    let sink = Arc::new(OutboxSink::new(cfg.outbox_path()?)?);
    let profile = Arc::new(profile);

    let mut tasks = JoinSet::new();
    for (i, zone) in zones.into_iter().enumerate() {
        let sink = Arc::clone(&sink);
        let profile = Arc::clone(&profile);
        tasks.spawn_blocking(move || (i, apply_to_zone(&*sink, &zone, Some(&*profile))));
    }

    let mut slots: Vec<Option<ZoneOutcome>> = vec![None; zone_ids.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((i, outcome)) => {
                if let Some(slot) = slots.get_mut(i) {
                    *slot = Some(outcome);
                }
            }
            Err(e) => warn!(error = %e, "zone push task failed to complete"),
        }
    }

    let report = BatchReport::from_slots(profile.id.clone(), &zone_ids, slots);
    info!(profile_id = %report.profile_id, succeeded = report.succeeded(), "push complete");

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "Pushed {} to {} of {} zones -> {}",
        profile.name,
        report.succeeded(),
        report.outcomes.len(),
        sink.path().display()
    );
    for o in report.failed() {
        if let Err(e) = &o.result {
            println!("  {} failed: {}", o.zone_id, e);
        }
    }
    Ok(())
}

pub fn show_outbox(limit: usize) -> Result<()> {
    let cfg = load_config()?;
    let path = cfg.outbox_path()?;
    let rows = read_outbox(&path)?;
    if rows.is_empty() {
        println!("No pushed setpoints in {}", path.display());
        return Ok(());
    }
    for (i, r) in rows.iter().rev().take(limit).enumerate() {
        println!(
            "{}. {} zone={} profile={} heat {:.1}/{:.1} cool {:.1}/{:.1}",
            i + 1,
            r.at.to_rfc3339(),
            r.zone_id,
            r.profile_id.as_deref().unwrap_or("-"),
            r.setpoints.occupied_heat,
            r.setpoints.unoccupied_heat,
            r.setpoints.occupied_cool,
            r.setpoints.unoccupied_cool
        );
    }
    Ok(())
}
