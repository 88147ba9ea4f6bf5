use super::*;
use crate::counters::{CounterFile, Counters, DayCounts};
use crate::direction::{BeamOrder, Direction, VehicleEvent};
use crate::error::PostboxError;
use crate::letter::LetterEvent;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::time::{timeout, Duration};

/// Records what it is given and fails on letters
struct CollectingPublisher {
    seen: Arc<Mutex<Vec<&'static str>>>,
    closed: Arc<Mutex<bool>>,
}

#[async_trait]
impl Publisher for CollectingPublisher {
    fn name(&self) -> &'static str {
        "collecting"
    }

    async fn publish(&mut self, event: &PostboxEvent) -> Result<()> {
        self.seen.lock().push(event.event_type());
        if event.event_type() == "letter_dropped" {
            return Err(PostboxError::component("collecting", "refusing letters"));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

fn letter() -> PostboxEvent {
    PostboxEvent::LetterDropped {
        event: LetterEvent {
            id: 0,
            timestamp: Utc.with_ymd_and_hms(2025, 12, 1, 18, 0, 0).unwrap(),
        },
    }
}

fn vehicle(direction: Direction) -> PostboxEvent {
    PostboxEvent::VehiclePassed {
        event: VehicleEvent {
            id: 1,
            direction,
            order: direction.is_known().then_some(BeamOrder::BA),
            timestamp: Utc.with_ymd_and_hms(2025, 12, 1, 18, 5, 0).unwrap(),
        },
        label: "Leaving".to_string(),
    }
}

fn counters_event(counters: Counters) -> PostboxEvent {
    PostboxEvent::CountersUpdated {
        counters,
        today: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
        timestamp: Utc.with_ymd_and_hms(2025, 12, 1, 18, 5, 0).unwrap(),
    }
}

fn sample_counters() -> Counters {
    let mut counters = Counters {
        total_inbound: 12,
        total_outbound: 8,
        total_letters: 3,
        ..Counters::default()
    };
    counters.per_day.insert(
        NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
        DayCounts {
            inbound: 2,
            outbound: 1,
            unknown: 4,
            letters: 1,
        },
    );
    counters
}

#[tokio::test]
async fn test_publisher_survives_failures_and_closes() {
    let bus = EventBus::new(16);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(Mutex::new(false));
    let token = CancellationToken::new();

    let handle = spawn_publisher(
        CollectingPublisher {
            seen: seen.clone(),
            closed: closed.clone(),
        },
        &bus,
        token.clone(),
    );

    bus.publish(letter()).unwrap();
    bus.publish(vehicle(Direction::Inbound)).unwrap();

    timeout(Duration::from_secs(1), async {
        while seen.lock().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    token.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    assert_eq!(*seen.lock(), vec!["letter_dropped", "vehicle_passed"]);
    assert!(*closed.lock());
}

#[tokio::test]
async fn test_lagging_publisher_drains_newest_events_on_cancel() {
    let bus = EventBus::new(4);
    let dir = tempdir().unwrap();
    let path = dir.path().join("counters.json");
    let persister = CounterPersister::new(CounterFile::new(&path));
    let receiver = bus.receiver(persister.filter(), persister.name());

    // Overflow the receiver before the publisher ever runs
    for total in 1..=10 {
        let counters = Counters {
            total_letters: total,
            ..Counters::default()
        };
        bus.publish(counters_event(counters)).unwrap();
    }

    let token = CancellationToken::new();
    token.cancel();
    timeout(
        Duration::from_secs(1),
        run_publisher(persister, receiver, token),
    )
    .await
    .unwrap();

    let saved = CounterFile::new(&path).load().await.unwrap();
    assert_eq!(saved.total_letters, 10);
}

#[tokio::test]
async fn test_counter_persister_saves_snapshots() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("counters.json");
    let mut persister = CounterPersister::new(CounterFile::new(&path));

    assert!(persister.filter().matches(&counters_event(Counters::default())));
    assert!(!persister.filter().matches(&letter()));

    persister.publish(&counters_event(sample_counters())).await.unwrap();

    let loaded = CounterFile::new(&path).load().await.unwrap();
    assert_eq!(loaded, sample_counters());
}

#[tokio::test]
async fn test_counter_persister_skips_unchanged_snapshot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("counters.json");
    let mut persister = CounterPersister::new(CounterFile::new(&path));

    persister.publish(&counters_event(sample_counters())).await.unwrap();
    std::fs::remove_file(&path).unwrap();
    persister.publish(&counters_event(sample_counters())).await.unwrap();

    assert!(!path.exists());
}

#[test]
fn test_letter_topics() {
    let layout = TopicLayout::new("santa_mailbox/", chrono_tz::UTC);
    let messages = layout.messages_for(&letter());

    let topics: Vec<&str> = messages.iter().map(|m| m.topic.as_str()).collect();
    assert_eq!(
        topics,
        vec![
            "santa_mailbox/state/letter",
            "santa_mailbox/state/last_letter",
            "santa_mailbox/event/letter",
        ]
    );
    assert_eq!(messages[0].payload, "ON");
    assert_eq!(messages[1].payload, "2025-12-01T18:00:00+00:00");
    assert!(messages[1].retain);
    assert_eq!(layout.letter_released().payload, "OFF");
}

#[test]
fn test_vehicle_topics() {
    let layout = TopicLayout::new("santa_mailbox", chrono_tz::UTC);

    let known = layout.messages_for(&vehicle(Direction::Outbound));
    assert_eq!(known.len(), 3);
    assert_eq!(known[1].topic, "santa_mailbox/state/last_dir");
    assert_eq!(known[1].payload, "Leaving");

    let payload: serde_json::Value = serde_json::from_str(&known[2].payload).unwrap();
    assert_eq!(payload["direction"], "outbound");
    assert_eq!(payload["order"], "BA");

    let unknown = layout.messages_for(&vehicle(Direction::Unknown));
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].topic, "santa_mailbox/event/car");
}

#[test]
fn test_counter_topics() {
    let layout = TopicLayout::new("santa_mailbox", chrono_tz::UTC);
    let messages = layout.messages_for(&counters_event(sample_counters()));

    let pairs: Vec<(&str, &str)> = messages
        .iter()
        .map(|m| (m.topic.as_str(), m.payload.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("santa_mailbox/state/car_total", "20"),
            ("santa_mailbox/state/car_today", "3"),
            ("santa_mailbox/state/inbound_today", "2"),
            ("santa_mailbox/state/outbound_today", "1"),
            ("santa_mailbox/state/letter_total", "3"),
        ]
    );
}

#[test]
fn test_timestamps_use_local_offset() {
    let layout = TopicLayout::new("box", chrono_tz::Europe::Berlin);
    let messages = layout.messages_for(&letter());

    assert_eq!(messages[1].payload, "2025-12-01T19:00:00+01:00");
    assert_eq!(layout.online().topic, "box/status");
    assert_eq!(layout.offline().payload, "offline");
}
