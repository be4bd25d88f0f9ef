//! occupancy-core: operating schedules, exception rules and HVAC setpoints
//! for multi-site facilities.

pub mod batch;
pub mod changelog;
pub mod error;
pub mod hours;
pub mod ledger;
pub mod phase;
pub mod policy;
pub mod recurrence;
pub mod rule;
pub mod setpoints;
pub mod site;
pub mod store;
pub mod time;

pub use batch::{BatchReport, SetpointSink, ZoneOutcome, apply_to_zone, push_profile};
pub use changelog::{ChangeAction, ChangeLogEntry};
pub use error::{ScheduleError, ScheduleResult};
pub use hours::{Hours, WeeklyHours};
pub use ledger::{
    DateWindow, LedgerEntry, Occurrence, OccurrenceOrigin, occurrences_on, override_occurrence, resolve,
};
pub use phase::{HoursSource, Phase, PhaseDecision, current_phase, decide, phase_at};
pub use policy::{
    DeleteClass, DeleteOutcome, EditOutcome, ProjectionHorizon, classify_delete, create_rule, delete_rule,
    edit_rule,
};
pub use recurrence::{ProjectedDate, SpanHours, expand, expand_between};
pub use rule::{DateRange, IntervalUnit, NewRule, RecurrenceSpec, RuleEdit, RuleId, ScheduleRule, SpanPosition};
pub use setpoints::{
    FanMode, HvacMode, HvacSettings, PhaseSetpoints, Profile, ResolvedSetpoints, SetpointSource, Zone,
    resolve_batch, resolve_setpoints, resolve_zone_setpoints,
};
pub use site::Site;
pub use store::{ChangeLog, HvacStore, LedgerStore, MemoryStore, RuleStore, SiteStore, Snapshot, Store};
pub use time::{LocalInstant, LocalToday};
