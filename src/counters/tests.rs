use super::*;
use crate::direction::{BeamOrder, Direction, VehicleEvent};
use crate::letter::LetterEvent;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tempfile::tempdir;

fn vehicle(id: u64, direction: Direction, timestamp: DateTime<Utc>) -> VehicleEvent {
    VehicleEvent {
        id,
        direction,
        order: direction.is_known().then_some(BeamOrder::AB),
        timestamp,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_totals_match_recorded_vehicles() {
    let mut store = CounterStore::new(chrono_tz::UTC);
    let day_one = Utc.with_ymd_and_hms(2025, 12, 1, 18, 0, 0).unwrap();
    let day_two = Utc.with_ymd_and_hms(2025, 12, 2, 18, 0, 0).unwrap();

    let mut id = 0;
    for (count, direction, at) in [
        (3, Direction::Inbound, day_one),
        (2, Direction::Outbound, day_one),
        (4, Direction::Inbound, day_two),
        (1, Direction::Outbound, day_two),
    ] {
        for _ in 0..count {
            assert!(store.record_vehicle(&vehicle(id, direction, at)));
            id += 1;
        }
    }

    let snapshot = store.snapshot();
    assert_eq!(snapshot.total_inbound, 7);
    assert_eq!(snapshot.total_outbound, 3);
    let bucketed: u64 = snapshot.per_day.values().map(|d| d.cars()).sum();
    assert_eq!(bucketed, 10);
    assert_eq!(snapshot.day(date(2025, 12, 1)).inbound, 3);
    assert_eq!(snapshot.day(date(2025, 12, 2)).outbound, 1);
    assert_eq!(snapshot.last_direction, Some(Direction::Outbound));
    assert_eq!(snapshot.last_car_ts, Some(day_two));
}

#[test]
fn test_recording_is_idempotent() {
    let mut store = CounterStore::new(chrono_tz::UTC);
    let at = Utc.with_ymd_and_hms(2025, 12, 1, 18, 0, 0).unwrap();
    let event = vehicle(4, Direction::Inbound, at);

    assert!(store.record_vehicle(&event));
    assert!(!store.record_vehicle(&event));
    assert!(!store.record_vehicle(&vehicle(2, Direction::Inbound, at)));

    let letter = LetterEvent { id: 0, timestamp: at };
    assert!(store.record_letter(&letter));
    assert!(!store.record_letter(&letter));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.total_inbound, 1);
    assert_eq!(snapshot.total_letters, 1);
}

#[test]
fn test_unknown_vehicles_do_not_touch_car_totals() {
    let mut store = CounterStore::new(chrono_tz::UTC);
    let at = Utc.with_ymd_and_hms(2025, 12, 1, 18, 0, 0).unwrap();

    store.record_vehicle(&vehicle(0, Direction::Unknown, at));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.car_total(), 0);
    assert_eq!(snapshot.total_unknown, 1);
    assert_eq!(snapshot.day(date(2025, 12, 1)).unknown, 1);
    assert_eq!(snapshot.last_car_ts, None);
    assert_eq!(snapshot.last_direction, None);
}

#[test]
fn test_letters_are_counted_per_day() {
    let mut store = CounterStore::new(chrono_tz::UTC);
    let at = Utc.with_ymd_and_hms(2025, 12, 1, 18, 0, 0).unwrap();

    store.record_letter(&LetterEvent { id: 0, timestamp: at });
    store.record_letter(&LetterEvent { id: 1, timestamp: at });

    let snapshot = store.snapshot();
    assert_eq!(snapshot.total_letters, 2);
    assert_eq!(snapshot.day(date(2025, 12, 1)).letters, 2);
    assert_eq!(snapshot.last_letter_ts, Some(at));
}

#[test]
fn test_day_follows_configured_timezone() {
    let mut store = CounterStore::new(chrono_tz::America::New_York);
    // 03:00 UTC on the 2nd is still the evening of the 1st in New York
    let at = Utc.with_ymd_and_hms(2025, 12, 2, 3, 0, 0).unwrap();

    store.record_vehicle(&vehicle(0, Direction::Inbound, at));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.day(date(2025, 12, 1)).inbound, 1);
    assert!(!snapshot.per_day.contains_key(&date(2025, 12, 2)));
}

#[test]
fn test_closed_days_are_never_rewritten() {
    let mut store = CounterStore::new(chrono_tz::UTC);
    let late = Utc.with_ymd_and_hms(2025, 12, 1, 23, 59, 59).unwrap();
    let next_day = Utc.with_ymd_and_hms(2025, 12, 2, 0, 0, 1).unwrap();

    store.record_vehicle(&vehicle(0, Direction::Inbound, late));
    store.record_vehicle(&vehicle(1, Direction::Inbound, next_day));
    // Delivered after the rollover, timestamped before it
    store.record_vehicle(&vehicle(2, Direction::Outbound, late));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.day(date(2025, 12, 1)), DayCounts {
        inbound: 1,
        ..DayCounts::default()
    });
    assert_eq!(snapshot.day(date(2025, 12, 2)).outbound, 1);
    assert_eq!(snapshot.latest_day(), Some(date(2025, 12, 2)));
}

#[test]
fn test_snapshot_is_detached() {
    let mut store = CounterStore::new(chrono_tz::UTC);
    let at = Utc.with_ymd_and_hms(2025, 12, 1, 18, 0, 0).unwrap();

    let before = store.snapshot();
    store.record_vehicle(&vehicle(0, Direction::Inbound, at));

    assert_eq!(before.total_inbound, 0);
    assert_eq!(store.snapshot().total_inbound, 1);
}

#[test]
fn test_resumes_from_persisted_counters() {
    let at = Utc.with_ymd_and_hms(2025, 12, 1, 18, 0, 0).unwrap();
    let mut saved = Counters {
        total_inbound: 10,
        total_outbound: 5,
        ..Counters::default()
    };
    saved.per_day.insert(
        date(2025, 12, 1),
        DayCounts {
            inbound: 2,
            ..DayCounts::default()
        },
    );

    let mut store = CounterStore::with_counters(saved, chrono_tz::UTC);
    // Sequence numbers restart at zero after a restart
    assert!(store.record_vehicle(&vehicle(0, Direction::Inbound, at)));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.total_inbound, 11);
    assert_eq!(snapshot.day(date(2025, 12, 1)).inbound, 3);
}

#[tokio::test]
async fn test_counter_file_round_trip() {
    let dir = tempdir().unwrap();
    let file = CounterFile::new(dir.path().join("state").join("counters.json"));

    let mut store = CounterStore::new(chrono_tz::UTC);
    let at = Utc.with_ymd_and_hms(2025, 12, 1, 18, 0, 0).unwrap();
    store.record_vehicle(&vehicle(0, Direction::Outbound, at));
    store.record_letter(&LetterEvent { id: 0, timestamp: at });
    let snapshot = store.snapshot();

    file.save(&snapshot).await.unwrap();
    let loaded = file.load().await.unwrap();

    assert_eq!(loaded, snapshot);
    assert!(!dir.path().join("state").join("counters.json.tmp").exists());
}

#[tokio::test]
async fn test_missing_counter_file_starts_empty() {
    let dir = tempdir().unwrap();
    let file = CounterFile::new(dir.path().join("absent.json"));

    assert_eq!(file.load().await.unwrap(), Counters::default());
}

#[tokio::test]
async fn test_corrupt_counter_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("counters.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let result = CounterFile::new(&path).load().await;
    assert!(matches!(result, Err(crate::error::PostboxError::Json(_))));
}
