//! Pushing resolved setpoints to many zones.
//!
//! Every zone is resolved and applied on its own; a failure is recorded in
//! that zone's outcome and the batch carries on.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ScheduleError, ScheduleResult};
use crate::setpoints::{Profile, ResolvedSetpoints, Zone, resolve_setpoints};
use crate::store::HvacStore;

/// The actuation layer that receives resolved setpoints.
pub trait SetpointSink: Send + Sync {
    fn apply(&self, zone: &Zone, setpoints: &ResolvedSetpoints) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneOutcome {
    pub zone_id: String,
    #[serde(with = "outcome_result")]
    pub result: Result<ResolvedSetpoints, String>,
}

impl ZoneOutcome {
    pub fn failed(zone_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            result: Err(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub profile_id: String,
    pub outcomes: Vec<ZoneOutcome>,
}

impl BatchReport {
    /// Build a report in zone order from per-zone slots filled by workers.
    /// A zone whose slot is still empty is reported as failed.
    pub fn from_slots(profile_id: impl Into<String>, zone_ids: &[String], slots: Vec<Option<ZoneOutcome>>) -> Self {
        let mut slots = slots.into_iter();
        let outcomes = zone_ids
            .iter()
            .map(|id| match slots.next().flatten() {
                Some(outcome) => outcome,
                None => {
                    warn!(zone_id = %id, "no result for zone");
                    ZoneOutcome::failed(id.as_str(), "push task did not complete")
                }
            })
            .collect();
        Self {
            profile_id: profile_id.into(),
            outcomes,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ZoneOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }
}

/// Resolve one zone against `profile` and hand the result to the sink.
pub fn apply_to_zone<K: SetpointSink + ?Sized>(sink: &K, zone: &Zone, profile: Option<&Profile>) -> ZoneOutcome {
    let setpoints = resolve_setpoints(zone, profile);
    let result = match sink.apply(zone, &setpoints) {
        Ok(()) => Ok(setpoints),
        Err(e) => {
            warn!(zone_id = %zone.id, error = %format!("{e:#}"), "setpoint push failed");
            Err(format!("{e:#}"))
        }
    };
    ZoneOutcome {
        zone_id: zone.id.clone(),
        result,
    }
}

/// Push a profile to every zone linked to it.
pub fn push_profile<S, K>(store: &S, sink: &K, profile_id: &str) -> ScheduleResult<BatchReport>
where
    S: HvacStore + ?Sized,
    K: SetpointSink + ?Sized,
{
    let profile = store
        .profile(profile_id)?
        .ok_or_else(|| ScheduleError::not_found("profile", profile_id))?;
    let zones = store.zones_for_profile(profile_id)?;

    let outcomes: Vec<ZoneOutcome> = zones
        .iter()
        .map(|zone| apply_to_zone(sink, zone, Some(&profile)))
        .collect();
    let report = BatchReport {
        profile_id: profile.id,
        outcomes,
    };
    info!(
        profile_id = %report.profile_id,
        zones = report.outcomes.len(),
        succeeded = report.succeeded(),
        "profile pushed"
    );
    Ok(report)
}

mod outcome_result {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::setpoints::ResolvedSetpoints;

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    enum Repr {
        Ok(ResolvedSetpoints),
        Error(String),
    }

    pub fn serialize<S: Serializer>(v: &Result<ResolvedSetpoints, String>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Ok(sp) => Repr::Ok(sp.clone()),
            Err(e) => Repr::Error(e.clone()),
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Result<ResolvedSetpoints, String>, D::Error> {
        Ok(match Repr::deserialize(d)? {
            Repr::Ok(sp) => Ok(sp),
            Repr::Error(e) => Err(e),
        })
    }
}
