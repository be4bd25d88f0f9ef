//! Setpoint resolution: profile -> zone override -> compiled-in defaults.
//!
//! [`resolve_setpoints`] is the authoritative, I/O-free form for callers that
//! already hold zone and profile rows. [`resolve_zone_setpoints`] loads them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, ScheduleResult};
use crate::phase::Phase;
use crate::store::HvacStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Auto,
    On,
    Circulate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Auto,
    Heat,
    Cool,
    Off,
}

/// Optional setpoint fields as stored on a zone or a profile. Degrees F.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HvacSettings {
    pub occupied_heat: Option<f64>,
    pub occupied_cool: Option<f64>,
    pub unoccupied_heat: Option<f64>,
    pub unoccupied_cool: Option<f64>,
    pub occupied_fan: Option<FanMode>,
    pub unoccupied_fan: Option<FanMode>,
    pub mode: Option<HvacMode>,
    pub guardrail_min: Option<f64>,
    pub guardrail_max: Option<f64>,
    /// How far a site manager may raise the cooling setpoint.
    pub manager_offset_up: Option<f64>,
    /// How far a site manager may lower the heating setpoint.
    pub manager_offset_down: Option<f64>,
    /// How long a manager adjustment holds before reverting.
    pub manager_offset_minutes: Option<u32>,
}

impl HvacSettings {
    /// Whether any heat or cool value is present.
    pub fn has_setpoints(&self) -> bool {
        self.occupied_heat.is_some()
            || self.occupied_cool.is_some()
            || self.unoccupied_heat.is_some()
            || self.unoccupied_cool.is_some()
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        let pairs = [
            ("occupied_cool", self.occupied_heat, self.occupied_cool),
            ("unoccupied_cool", self.unoccupied_heat, self.unoccupied_cool),
            ("guardrail_max", self.guardrail_min, self.guardrail_max),
        ];
        for (field, low, high) in pairs {
            if let (Some(low), Some(high)) = (low, high) {
                if high < low {
                    return Err(ScheduleError::validation(field, format!("{high} is below {low}")));
                }
            }
        }
        for (field, v) in [
            ("manager_offset_up", self.manager_offset_up),
            ("manager_offset_down", self.manager_offset_down),
        ] {
            if v.is_some_and(|v| v < 0.0) {
                return Err(ScheduleError::validation(field, "must not be negative"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub site_id: String,
    pub name: String,
    pub profile_id: Option<String>,
    /// Own fields win over the linked profile.
    #[serde(default)]
    pub is_override: bool,
    #[serde(default)]
    pub settings: HvacSettings,
}

impl Zone {
    pub fn new(id: impl Into<String>, site_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            site_id: site_id.into(),
            name: name.into(),
            profile_id: None,
            is_override: false,
            settings: HvacSettings::default(),
        }
    }

    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }

    pub fn with_settings(mut self, settings: HvacSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub settings: HvacSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetpointSource {
    Profile,
    ZoneOverride,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSetpoints {
    pub occupied_heat: f64,
    pub occupied_cool: f64,
    pub unoccupied_heat: f64,
    pub unoccupied_cool: f64,
    pub occupied_fan: FanMode,
    pub unoccupied_fan: FanMode,
    pub mode: HvacMode,
    pub guardrail_min: f64,
    pub guardrail_max: f64,
    pub manager_offset_up: f64,
    pub manager_offset_down: f64,
    pub manager_offset_minutes: u32,
    pub source: SetpointSource,
    /// Display name of the profile when `source` is `Profile`.
    pub profile_name: Option<String>,
}

pub const DEFAULT_OCCUPIED_HEAT: f64 = 70.0;
pub const DEFAULT_OCCUPIED_COOL: f64 = 74.0;
pub const DEFAULT_UNOCCUPIED_HEAT: f64 = 62.0;
pub const DEFAULT_UNOCCUPIED_COOL: f64 = 80.0;
pub const DEFAULT_FAN: FanMode = FanMode::Auto;
pub const DEFAULT_MODE: HvacMode = HvacMode::Auto;
pub const DEFAULT_GUARDRAIL_MIN: f64 = 55.0;
pub const DEFAULT_GUARDRAIL_MAX: f64 = 85.0;
pub const DEFAULT_MANAGER_OFFSET: f64 = 2.0;
pub const DEFAULT_MANAGER_OFFSET_MINUTES: u32 = 120;

/// Merge one level of the cascade over the compiled-in defaults.
fn merge(settings: &HvacSettings, source: SetpointSource, profile_name: Option<String>) -> ResolvedSetpoints {
    ResolvedSetpoints {
        occupied_heat: settings.occupied_heat.unwrap_or(DEFAULT_OCCUPIED_HEAT),
        occupied_cool: settings.occupied_cool.unwrap_or(DEFAULT_OCCUPIED_COOL),
        unoccupied_heat: settings.unoccupied_heat.unwrap_or(DEFAULT_UNOCCUPIED_HEAT),
        unoccupied_cool: settings.unoccupied_cool.unwrap_or(DEFAULT_UNOCCUPIED_COOL),
        occupied_fan: settings.occupied_fan.unwrap_or(DEFAULT_FAN),
        unoccupied_fan: settings.unoccupied_fan.unwrap_or(DEFAULT_FAN),
        mode: settings.mode.unwrap_or(DEFAULT_MODE),
        guardrail_min: settings.guardrail_min.unwrap_or(DEFAULT_GUARDRAIL_MIN),
        guardrail_max: settings.guardrail_max.unwrap_or(DEFAULT_GUARDRAIL_MAX),
        manager_offset_up: settings.manager_offset_up.unwrap_or(DEFAULT_MANAGER_OFFSET),
        manager_offset_down: settings.manager_offset_down.unwrap_or(DEFAULT_MANAGER_OFFSET),
        manager_offset_minutes: settings
            .manager_offset_minutes
            .unwrap_or(DEFAULT_MANAGER_OFFSET_MINUTES),
        source,
        profile_name,
    }
}

/// Resolve a zone's setpoints from rows the caller already loaded.
///
/// `profile` only counts when it is the one the zone links to.
pub fn resolve_setpoints(zone: &Zone, profile: Option<&Profile>) -> ResolvedSetpoints {
    let linked = profile.filter(|p| zone.profile_id.as_deref() == Some(p.id.as_str()));
    let own = zone.settings.has_setpoints();

    if (zone.is_override || zone.profile_id.is_none()) && own {
        return merge(&zone.settings, SetpointSource::ZoneOverride, None);
    }
    if let Some(p) = linked {
        return merge(&p.settings, SetpointSource::Profile, Some(p.name.clone()));
    }
    if own {
        // linked profile is missing
        return merge(&zone.settings, SetpointSource::ZoneOverride, None);
    }
    merge(&HvacSettings::default(), SetpointSource::Default, None)
}

/// Pure batch form: resolve many zones against an already-loaded profile set.
pub fn resolve_batch<'a>(zones: &'a [Zone], profiles: &[Profile]) -> Vec<(&'a Zone, ResolvedSetpoints)> {
    let by_id: HashMap<&str, &Profile> = profiles.iter().map(|p| (p.id.as_str(), p)).collect();
    zones
        .iter()
        .map(|z| {
            let profile = z.profile_id.as_deref().and_then(|id| by_id.get(id).copied());
            (z, resolve_setpoints(z, profile))
        })
        .collect()
}

/// Load the zone and its linked profile, then resolve.
pub fn resolve_zone_setpoints<S: HvacStore + ?Sized>(store: &S, zone_id: &str) -> ScheduleResult<ResolvedSetpoints> {
    let zone = store
        .zone(zone_id)?
        .ok_or_else(|| ScheduleError::not_found("zone", zone_id))?;
    let profile = match zone.profile_id.as_deref() {
        Some(id) => store.profile(id)?,
        None => None,
    };
    Ok(resolve_setpoints(&zone, profile.as_ref()))
}

/// Setpoints for one phase, with the window a manager may adjust within.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSetpoints {
    pub phase: Phase,
    pub heat: f64,
    pub cool: f64,
    pub fan: FanMode,
    pub mode: HvacMode,
    pub min_allowed: f64,
    pub max_allowed: f64,
}

impl ResolvedSetpoints {
    pub fn for_phase(&self, phase: Phase) -> PhaseSetpoints {
        let (heat, cool, fan) = match phase {
            Phase::Occupied => (self.occupied_heat, self.occupied_cool, self.occupied_fan),
            Phase::Unoccupied => (self.unoccupied_heat, self.unoccupied_cool, self.unoccupied_fan),
        };
        PhaseSetpoints {
            phase,
            heat,
            cool,
            fan,
            mode: self.mode,
            min_allowed: (heat - self.manager_offset_down).max(self.guardrail_min),
            max_allowed: (cool + self.manager_offset_up).min(self.guardrail_max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            id: "p1".to_string(),
            name: "Office standard".to_string(),
            settings: HvacSettings {
                occupied_heat: Some(69.0),
                occupied_cool: Some(75.0),
                unoccupied_heat: Some(60.0),
                unoccupied_cool: Some(84.0),
                occupied_fan: Some(FanMode::On),
                mode: Some(HvacMode::Auto),
                ..Default::default()
            },
        }
    }

    fn stale_settings() -> HvacSettings {
        HvacSettings {
            occupied_heat: Some(50.0),
            occupied_cool: Some(90.0),
            ..Default::default()
        }
    }

    #[test]
    fn linked_profile_wins_over_stale_zone_fields() {
        let zone = Zone::new("z1", "s1", "Lobby").with_profile("p1").with_settings(stale_settings());
        let out = resolve_setpoints(&zone, Some(&profile()));
        assert_eq!(out.source, SetpointSource::Profile);
        assert_eq!(out.profile_name.as_deref(), Some("Office standard"));
        assert_eq!(out.occupied_heat, 69.0);
        assert_eq!(out.occupied_cool, 75.0);
        assert_eq!(out.unoccupied_cool, 84.0);
        assert_eq!(out.occupied_fan, FanMode::On);
    }

    #[test]
    fn override_flag_uses_zone_fields_with_field_defaults() {
        let mut zone = Zone::new("z1", "s1", "Lobby").with_profile("p1").with_settings(stale_settings());
        zone.is_override = true;
        let out = resolve_setpoints(&zone, Some(&profile()));
        assert_eq!(out.source, SetpointSource::ZoneOverride);
        assert_eq!(out.occupied_heat, 50.0);
        assert_eq!(out.unoccupied_heat, DEFAULT_UNOCCUPIED_HEAT);
        assert_eq!(out.occupied_fan, DEFAULT_FAN);
        assert!(out.profile_name.is_none());
    }

    #[test]
    fn override_flag_without_own_values_falls_to_profile() {
        let mut zone = Zone::new("z1", "s1", "Lobby").with_profile("p1");
        zone.is_override = true;
        assert_eq!(resolve_setpoints(&zone, Some(&profile())).source, SetpointSource::Profile);
    }

    #[test]
    fn missing_profile_falls_back_to_zone_values() {
        let zone = Zone::new("z1", "s1", "Lobby").with_profile("gone").with_settings(stale_settings());
        let out = resolve_setpoints(&zone, None);
        assert_eq!(out.source, SetpointSource::ZoneOverride);
        assert_eq!(out.occupied_cool, 90.0);
    }

    #[test]
    fn mismatched_profile_row_is_ignored() {
        let zone = Zone::new("z1", "s1", "Lobby").with_profile("p2");
        let out = resolve_setpoints(&zone, Some(&profile()));
        assert_eq!(out.source, SetpointSource::Default);
    }

    #[test]
    fn nothing_anywhere_resolves_to_defaults() {
        let zone = Zone::new("z1", "s1", "Lobby");
        let out = resolve_setpoints(&zone, None);
        assert_eq!(out.source, SetpointSource::Default);
        assert_eq!(out, merge(&HvacSettings::default(), SetpointSource::Default, None));
        assert_eq!(out.occupied_heat, DEFAULT_OCCUPIED_HEAT);
        assert_eq!(out.guardrail_max, DEFAULT_GUARDRAIL_MAX);
        assert_eq!(out.manager_offset_minutes, DEFAULT_MANAGER_OFFSET_MINUTES);
    }

    #[test]
    fn phase_window_is_clipped_to_guardrails() {
        let zone = Zone::new("z1", "s1", "Lobby").with_settings(HvacSettings {
            occupied_heat: Some(56.0),
            occupied_cool: Some(84.0),
            ..Default::default()
        });
        let occupied = resolve_setpoints(&zone, None).for_phase(Phase::Occupied);
        assert_eq!(occupied.heat, 56.0);
        assert_eq!(occupied.min_allowed, DEFAULT_GUARDRAIL_MIN);
        assert_eq!(occupied.max_allowed, DEFAULT_GUARDRAIL_MAX);

        let unoccupied = resolve_setpoints(&zone, None).for_phase(Phase::Unoccupied);
        assert_eq!(unoccupied.heat, DEFAULT_UNOCCUPIED_HEAT);
        assert_eq!(unoccupied.min_allowed, DEFAULT_UNOCCUPIED_HEAT - DEFAULT_MANAGER_OFFSET);
    }

    #[test]
    fn batch_matches_single_resolution() {
        let zones = vec![
            Zone::new("z1", "s1", "Lobby").with_profile("p1"),
            Zone::new("z2", "s1", "Office"),
        ];
        let out = resolve_batch(&zones, &[profile()]);
        assert_eq!(out[0].1, resolve_setpoints(&zones[0], Some(&profile())));
        assert_eq!(out[1].1.source, SetpointSource::Default);
    }

    #[test]
    fn settings_validation_catches_inverted_pairs() {
        let bad = HvacSettings {
            occupied_heat: Some(75.0),
            occupied_cool: Some(70.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(profile().settings.validate().is_ok());
    }
}
