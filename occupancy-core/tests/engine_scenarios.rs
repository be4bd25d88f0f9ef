use std::sync::Arc;
use std::thread;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use occupancy_core::{
    ChangeAction, ChangeLog, DateRange, DateWindow, DeleteClass, HoursSource, HvacSettings, HvacStore, Hours,
    LedgerStore, LocalToday, MemoryStore, NewRule, OccurrenceOrigin, Phase, Profile, ProjectionHorizon,
    RecurrenceSpec, RuleEdit, RuleStore, ScheduleError, Site, SiteStore, SetpointSource, WeeklyHours, Zone, create_rule,
    current_phase, delete_rule, edit_rule, override_occurrence, phase_at, resolve, resolve_zone_setpoints,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn store_with_site(tz: &str) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .put_site(Site::new("s1", "Main Street", tz).with_hours(WeeklyHours::weekdays(t(8, 0), t(18, 0))))
        .unwrap();
    store
}

fn new_rule(name: &str, hours: Hours, recurrence: RecurrenceSpec) -> NewRule {
    NewRule {
        site_id: "s1".to_string(),
        name: name.to_string(),
        hours,
        recurrence,
        effective_from: None,
    }
}

fn saturdays(hours: Hours) -> NewRule {
    new_rule(
        "Saturday events",
        hours,
        RecurrenceSpec::WeeklyDays {
            days: vec![Weekday::Sat],
        },
    )
}

/// Fourth Thursday of November lands on the right date in consecutive years.
#[test]
fn test_thanksgiving_closure_across_years() {
    let store = store_with_site("America/New_York");
    let today = LocalToday::on(d(2024, 1, 10));
    let rule = create_rule(
        &store,
        new_rule(
            "Thanksgiving",
            Hours::closed(),
            RecurrenceSpec::NthWeekday {
                month: 11,
                weekday: Weekday::Thu,
                occurrence: 4,
            },
        ),
        today,
        "tester",
    )
    .unwrap();

    let listed = resolve(&store, "s1", DateWindow::default_for(today), today).unwrap();
    let dates: Vec<NaiveDate> = listed.iter().map(|o| o.date).collect();
    assert_eq!(dates, vec![d(2024, 11, 28), d(2025, 11, 27)]);
    assert!(listed.iter().all(|o| o.rule_id == rule.id && o.hours.closed));
    assert!(listed.iter().all(|o| o.origin == OccurrenceOrigin::Live));
    assert_eq!(store.ledger_len(), 0);
}

/// Check-in/check-out span: open from 15:00 on the first day, all day in the
/// middle, until 11:00 on the last day.
#[test]
fn test_check_in_check_out_phases() {
    let store = store_with_site("UTC");
    let today = LocalToday::on(d(2024, 12, 1));
    let range = DateRange::check_in_out(d(2024, 12, 24), d(2024, 12, 26), t(15, 0), t(11, 0));
    create_rule(
        &store,
        new_rule("Holiday stay", Hours::closed(), RecurrenceSpec::DateRangeDaily(range)),
        today,
        "tester",
    )
    .unwrap();

    let at = |m: u32, day: u32, h: u32, min: u32| Utc.with_ymd_and_hms(2024, m, day, h, min, 0).unwrap();

    // Tuesday base hours would be open at 14:00; the span replaces them.
    assert_eq!(current_phase(&store, "s1", at(12, 24, 14, 0)).unwrap().phase, Phase::Unoccupied);
    assert_eq!(current_phase(&store, "s1", at(12, 24, 15, 0)).unwrap().phase, Phase::Occupied);
    assert_eq!(current_phase(&store, "s1", at(12, 25, 3, 0)).unwrap().phase, Phase::Occupied);
    assert_eq!(current_phase(&store, "s1", at(12, 26, 10, 59)).unwrap().phase, Phase::Occupied);
    assert_eq!(current_phase(&store, "s1", at(12, 26, 11, 0)).unwrap().phase, Phase::Unoccupied);

    // The day after the span falls back to the base week.
    let after = current_phase(&store, "s1", at(12, 27, 9, 0)).unwrap();
    assert_eq!(after.phase, Phase::Occupied);
    assert_eq!(after.source, HoursSource::BaseWeek);
}

/// 05:30 UTC on March 1 is still February 29 in Chicago.
#[test]
fn test_phase_uses_site_local_date() {
    let store = store_with_site("America/Chicago");
    create_rule(
        &store,
        new_rule(
            "Leap day late shift",
            Hours::open(t(20, 0), t(23, 59)),
            RecurrenceSpec::Single { date: d(2024, 2, 29) },
        ),
        LocalToday::on(d(2024, 2, 1)),
        "tester",
    )
    .unwrap();

    let now = Utc.with_ymd_and_hms(2024, 3, 1, 5, 30, 0).unwrap();
    let decision = current_phase(&store, "s1", now).unwrap();
    assert_eq!(decision.local_date, d(2024, 2, 29));
    assert_eq!(decision.local_time, t(23, 30));
    assert_eq!(decision.phase, Phase::Occupied);
    assert!(matches!(decision.source, HoursSource::Exception { .. }));
}

/// Editing a rule after some of its dates have passed leaves those dates as
/// they were and applies the new hours from today.
#[test]
fn test_edit_keeps_past_occurrences_stable() {
    let store = store_with_site("UTC");
    let created = LocalToday::on(d(2024, 7, 1));
    let rule = create_rule(&store, saturdays(Hours::open(t(10, 0), t(14, 0))), created, "tester").unwrap();

    let later = LocalToday::on(d(2024, 7, 15));
    let july = DateWindow::new(d(2024, 7, 1), d(2024, 7, 31)).unwrap();
    let before = resolve(&store, "s1", july, later).unwrap();
    assert_eq!(before.len(), 4);

    let edit = RuleEdit {
        hours: Some(Hours::open(t(9, 0), t(17, 0))),
        ..Default::default()
    };
    let outcome = edit_rule(&store, &rule.id, edit, later, "tester").unwrap();
    let capped = outcome.superseded.expect("rule with history must split");
    assert_eq!(capped.effective_to, Some(d(2024, 7, 14)));
    assert_eq!(outcome.rule.supersedes.as_deref(), Some(rule.id.as_str()));
    assert_eq!(outcome.rule.effective_from, d(2024, 7, 15));

    let after = resolve(&store, "s1", july, later).unwrap();
    let summary: Vec<(NaiveDate, Option<NaiveTime>, OccurrenceOrigin)> =
        after.iter().map(|o| (o.date, o.hours.open, o.origin)).collect();
    assert_eq!(
        summary,
        vec![
            (d(2024, 7, 6), Some(t(10, 0)), OccurrenceOrigin::Frozen),
            (d(2024, 7, 13), Some(t(10, 0)), OccurrenceOrigin::Frozen),
            (d(2024, 7, 20), Some(t(9, 0)), OccurrenceOrigin::Live),
            (d(2024, 7, 27), Some(t(9, 0)), OccurrenceOrigin::Live),
        ]
    );
    assert_eq!(&after[..2], &before[..2]);

    let actions: Vec<ChangeAction> = store.entries(None).unwrap().into_iter().map(|e| e.action).collect();
    assert!(actions.contains(&ChangeAction::Created));
    assert!(actions.contains(&ChangeAction::Superseded));
}

/// Many readers freezing the same past dates at once end up with one ledger
/// entry per date and identical answers.
#[test]
fn test_concurrent_resolves_freeze_once() {
    let store = Arc::new(store_with_site("UTC"));
    create_rule(
        &*store,
        new_rule(
            "Weekend closure",
            Hours::closed(),
            RecurrenceSpec::WeeklyDays {
                days: vec![Weekday::Sat, Weekday::Sun],
            },
        ),
        LocalToday::on(d(2024, 1, 1)),
        "tester",
    )
    .unwrap();

    let window = DateWindow::new(d(2024, 1, 1), d(2024, 3, 31)).unwrap();
    let base = Utc.with_ymd_and_hms(2024, 4, 2, 12, 0, 0).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let today = LocalToday::from_utc(base + Duration::seconds(i), chrono_tz::UTC);
                resolve(&*store, "s1", window, today).unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // 2024-01-06 through 2024-03-31: 13 Saturdays and 13 Sundays.
    assert_eq!(results[0].len(), 26);
    assert!(results.iter().all(|r| r == &results[0]));
    assert!(results[0].iter().all(|o| o.origin == OccurrenceOrigin::Frozen));
    assert_eq!(store.ledger_len(), 26);

    let rule_id = &results[0][0].rule_id;
    let first = store.entry(rule_id, d(2024, 1, 6)).unwrap().unwrap();
    let again = resolve(&*store, "s1", window, LocalToday::on(d(2024, 6, 1))).unwrap();
    assert_eq!(again, results[0]);
    assert_eq!(store.entry(rule_id, d(2024, 1, 6)).unwrap().unwrap(), first);
}

/// Full delete retires the rule; frozen history stays listed.
#[test]
fn test_full_delete_keeps_history() {
    let store = store_with_site("UTC");
    let rule = create_rule(&store, saturdays(Hours::closed()), LocalToday::on(d(2024, 7, 1)), "tester").unwrap();

    let today = LocalToday::on(d(2024, 7, 15));
    let july = DateWindow::new(d(2024, 7, 1), d(2024, 7, 31)).unwrap();
    resolve(&store, "s1", july, today).unwrap();

    let outcome = delete_rule(&store, &rule.id, None, today, ProjectionHorizon::default(), "tester").unwrap();
    assert_eq!(outcome.class, DeleteClass::FullDelete);
    assert!(outcome.retired);
    assert!(outcome.removed > 0);

    let dates: Vec<NaiveDate> = resolve(&store, "s1", july, today)
        .unwrap()
        .iter()
        .map(|o| o.date)
        .collect();
    assert_eq!(dates, vec![d(2024, 7, 6), d(2024, 7, 13)]);

    let logged = store.entries(Some(&rule.id)).unwrap();
    let last = logged.last().unwrap();
    assert_eq!(last.action, ChangeAction::FullDelete);
    assert_eq!(last.removed_count, outcome.removed);
}

/// Full delete before anything was listed still keeps every past date.
#[test]
fn test_full_delete_without_listing_keeps_history() {
    let store = store_with_site("UTC");
    let created = LocalToday::on(d(2024, 7, 1));
    let weekly = create_rule(&store, saturdays(Hours::closed()), created, "tester").unwrap();
    let once = create_rule(
        &store,
        new_rule("Fourth of July", Hours::closed(), RecurrenceSpec::Single { date: d(2024, 7, 4) }),
        created,
        "tester",
    )
    .unwrap();

    let today = LocalToday::on(d(2024, 7, 15));
    for id in [&weekly.id, &once.id] {
        delete_rule(&store, id, None, today, ProjectionHorizon::default(), "tester").unwrap();
    }
    assert_eq!(store.rule(&weekly.id).unwrap().unwrap().effective_to, Some(d(2024, 7, 14)));

    let july = DateWindow::new(d(2024, 7, 1), d(2024, 7, 31)).unwrap();
    let listed = resolve(&store, "s1", july, today).unwrap();
    let dates: Vec<NaiveDate> = listed.iter().map(|o| o.date).collect();
    assert_eq!(dates, vec![d(2024, 7, 4), d(2024, 7, 6), d(2024, 7, 13)]);
    assert!(listed.iter().all(|o| o.origin == OccurrenceOrigin::Frozen));

    let saturday_noon = Utc.with_ymd_and_hms(2024, 7, 6, 12, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
    let decision = phase_at(&store, "s1", saturday_noon, now).unwrap();
    assert!(matches!(decision.source, HoursSource::Exception { ref rule_id, .. } if *rule_id == weekly.id));
}

/// Partial delete caps the rule; a cap in the past is refused.
#[test]
fn test_partial_delete_caps_rule() {
    let store = store_with_site("UTC");
    let rule = create_rule(&store, saturdays(Hours::closed()), LocalToday::on(d(2024, 7, 1)), "tester").unwrap();
    let today = LocalToday::on(d(2024, 7, 15));

    let err = delete_rule(&store, &rule.id, Some(d(2024, 7, 10)), today, ProjectionHorizon::default(), "tester")
        .unwrap_err();
    assert!(matches!(err, ScheduleError::ForwardOnly { .. }));

    let outcome =
        delete_rule(&store, &rule.id, Some(d(2024, 8, 1)), today, ProjectionHorizon::default(), "tester").unwrap();
    assert_eq!(outcome.class, DeleteClass::PartialDelete { cap_date: d(2024, 7, 31) });
    assert!(!outcome.retired);
    assert_eq!(outcome.rule.effective_to, Some(d(2024, 7, 31)));

    let summer = DateWindow::new(d(2024, 7, 15), d(2024, 8, 31)).unwrap();
    let dates: Vec<NaiveDate> = resolve(&store, "s1", summer, today)
        .unwrap()
        .iter()
        .map(|o| o.date)
        .collect();
    assert_eq!(dates, vec![d(2024, 7, 20), d(2024, 7, 27)]);
}

/// A manual override wins for its date and only its date.
#[test]
fn test_override_changes_one_date() {
    let store = store_with_site("UTC");
    let today = LocalToday::on(d(2024, 7, 1));
    let rule = create_rule(&store, saturdays(Hours::closed()), today, "tester").unwrap();

    override_occurrence(&store, &rule.id, d(2024, 7, 20), Hours::open(t(12, 0), t(13, 0)), today, "manager").unwrap();

    let err = override_occurrence(&store, &rule.id, d(2024, 7, 19), Hours::closed(), today, "manager").unwrap_err();
    assert!(matches!(err, ScheduleError::Validation { field: "date", .. }));

    let noon = Utc.with_ymd_and_hms(2024, 7, 20, 12, 30, 0).unwrap();
    let decision = current_phase(&store, "s1", noon).unwrap();
    assert_eq!(decision.phase, Phase::Occupied);
    assert!(matches!(decision.source, HoursSource::Exception { is_override: true, .. }));

    let next = Utc.with_ymd_and_hms(2024, 7, 27, 12, 30, 0).unwrap();
    assert_eq!(current_phase(&store, "s1", next).unwrap().phase, Phase::Unoccupied);
}

/// Profile, zone override and defaults resolve independently per zone, and
/// the phase picks which half of the setpoints applies.
#[test]
fn test_setpoint_cascade_follows_phase() {
    let store = store_with_site("UTC");
    store
        .put_profile(Profile {
            id: "retail".to_string(),
            name: "Retail floor".to_string(),
            settings: HvacSettings {
                occupied_heat: Some(69.0),
                occupied_cool: Some(73.0),
                unoccupied_heat: Some(60.0),
                ..Default::default()
            },
        })
        .unwrap();
    store.put_zone(Zone::new("floor", "s1", "Sales floor").with_profile("retail")).unwrap();
    let mut office = Zone::new("office", "s1", "Back office")
        .with_profile("retail")
        .with_settings(HvacSettings {
            occupied_heat: Some(72.0),
            ..Default::default()
        });
    office.is_override = true;
    store.put_zone(office).unwrap();
    store.put_zone(Zone::new("dock", "s1", "Loading dock")).unwrap();

    let floor = resolve_zone_setpoints(&store, "floor").unwrap();
    assert_eq!(floor.source, SetpointSource::Profile);
    assert_eq!(floor.profile_name.as_deref(), Some("Retail floor"));
    assert_eq!(floor.unoccupied_cool, 80.0);

    let office = resolve_zone_setpoints(&store, "office").unwrap();
    assert_eq!(office.source, SetpointSource::ZoneOverride);
    assert_eq!(office.occupied_heat, 72.0);

    let dock = resolve_zone_setpoints(&store, "dock").unwrap();
    assert_eq!(dock.source, SetpointSource::Default);

    // Wednesday 10:00 is inside base hours.
    let open = current_phase(&store, "s1", Utc.with_ymd_and_hms(2024, 7, 3, 10, 0, 0).unwrap()).unwrap();
    let active = floor.for_phase(open.phase);
    assert_eq!((active.heat, active.cool), (69.0, 73.0));
    assert_eq!((active.min_allowed, active.max_allowed), (67.0, 75.0));

    let closed = current_phase(&store, "s1", Utc.with_ymd_and_hms(2024, 7, 3, 22, 0, 0).unwrap()).unwrap();
    let idle = floor.for_phase(closed.phase);
    assert_eq!(idle.heat, 60.0);
    assert_eq!(idle.min_allowed, 58.0);
    assert_eq!(idle.max_allowed, 82.0);

    assert!(resolve_zone_setpoints(&store, "missing").unwrap_err().is_not_found());
    assert_eq!(store.zones_for_site("s1").unwrap().len(), 3);
}
