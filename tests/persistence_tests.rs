//! Persistence scenarios across simulated restarts: every store mutation
//! must survive a reload from the same backend.

mod common;

use common::{draft, reading};
use wakelight::{
    AlarmKind, AlarmPatch, AlarmStore, MemoryStore, Region, SettingsPatch, SettingsStore,
    TimeOfDay, Weekday,
};

#[test]
fn created_alarm_round_trips_field_for_field() {
    let mut backend = MemoryStore::new();

    let id = {
        let mut store = AlarmStore::load(&mut backend);
        let mut wanted = draft(6, 45, AlarmKind::Recurring, &[0, 2, 4]);
        wanted.max_brightness = 70;
        wanted.ramp_duration = 25;
        wanted.color_temp = 10;
        store.create(wanted).unwrap()
    };

    let store = AlarmStore::load(&mut backend);
    let alarm = store.get(id).unwrap();
    assert_eq!(alarm.id, id);
    assert_eq!(alarm.time, TimeOfDay { hour: 6, minute: 45 });
    assert_eq!(alarm.kind, AlarmKind::Recurring);
    assert_eq!(alarm.days.as_slice(), &[0, 2, 4]);
    assert_eq!(alarm.max_brightness, 70);
    assert_eq!(alarm.ramp_duration, 25);
    assert_eq!(alarm.color_temp, 10);
    assert!(alarm.enabled);
    assert!(alarm.last_triggered.is_none());
}

#[test]
fn trigger_bookkeeping_survives_a_restart() {
    let mut backend = MemoryStore::new();
    let monday = reading(Weekday::Monday, 7, 0);

    let (recurring, one_time) = {
        let mut store = AlarmStore::load(&mut backend);
        let recurring = store
            .create(draft(7, 0, AlarmKind::Recurring, &[0]))
            .unwrap();
        let one_time = store.create(draft(7, 0, AlarmKind::OneTime, &[])).unwrap();
        store
            .mark_triggered(recurring, monday.datetime.date())
            .unwrap();
        store
            .mark_triggered(one_time, monday.datetime.date())
            .unwrap();
        (recurring, one_time)
    };

    // After the restart neither alarm fires again at the same minute.
    let store = AlarmStore::load(&mut backend);
    assert_eq!(
        store.get(recurring).unwrap().last_triggered,
        Some(monday.datetime.date())
    );
    assert!(!store.get(one_time).unwrap().enabled);
    assert!(store.find_due(&monday).is_empty());
}

#[test]
fn updates_and_deletes_survive_a_restart() {
    let mut backend = MemoryStore::new();

    let (kept, dropped) = {
        let mut store = AlarmStore::load(&mut backend);
        let kept = store.create(draft(7, 0, AlarmKind::Recurring, &[0])).unwrap();
        let dropped = store.create(draft(8, 0, AlarmKind::OneTime, &[])).unwrap();
        let patch = AlarmPatch {
            time: Some(TimeOfDay { hour: 5, minute: 30 }),
            ..AlarmPatch::default()
        };
        store.update(kept, &patch).unwrap();
        store.delete(dropped).unwrap();
        (kept, dropped)
    };

    let store = AlarmStore::load(&mut backend);
    assert_eq!(store.list().len(), 1);
    assert_eq!(
        store.get(kept).unwrap().time,
        TimeOfDay { hour: 5, minute: 30 }
    );
    assert!(store.get(dropped).is_err());
}

#[test]
fn ids_continue_from_the_highest_survivor() {
    let mut backend = MemoryStore::new();

    {
        let mut store = AlarmStore::load(&mut backend);
        let _first = store.create(draft(7, 0, AlarmKind::Recurring, &[0])).unwrap();
        let second = store.create(draft(8, 0, AlarmKind::Recurring, &[1])).unwrap();
        assert_eq!(second, 1);
    }

    let mut store = AlarmStore::load(&mut backend);
    let third = store.create(draft(9, 0, AlarmKind::Recurring, &[2])).unwrap();
    assert_eq!(third, 2);
}

#[test]
fn corrupt_alarm_storage_recovers_to_a_working_store() {
    let mut backend = MemoryStore::new();
    backend
        .preload(Region::Alarms, b"this is not json")
        .unwrap();

    {
        let mut store = AlarmStore::load(&mut backend);
        assert!(store.list().is_empty());

        // The store works normally after recovery.
        store.create(draft(7, 0, AlarmKind::Recurring, &[0])).unwrap();
    }

    let store = AlarmStore::load(&mut backend);
    assert_eq!(store.list().len(), 1);
}

#[test]
fn settings_updates_survive_a_restart() {
    let mut backend = MemoryStore::new();

    {
        let mut store = SettingsStore::load(&mut backend);
        let patch = SettingsPatch {
            timezone: Some(9),
            brightness: Some(40),
            ..SettingsPatch::default()
        };
        store.update(&patch).unwrap();
    }

    let store = SettingsStore::load(&mut backend);
    assert_eq!(store.get().timezone, 9);
    assert_eq!(store.get().brightness, 40);
    assert_eq!(store.get().ntp_server.as_str(), "pool.ntp.org");
}
