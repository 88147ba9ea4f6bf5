use crate::direction::{Direction, VehicleEvent};
use crate::letter::LetterEvent;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Counts for a single local calendar day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCounts {
    pub inbound: u64,
    pub outbound: u64,
    #[serde(default)]
    pub unknown: u64,
    #[serde(default)]
    pub letters: u64,
}

impl DayCounts {
    /// Vehicles with a known direction
    pub fn cars(&self) -> u64 {
        self.inbound + self.outbound
    }
}

/// Traffic and letter counters
///
/// Only ever handed out by value through [`CounterStore::snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub total_inbound: u64,
    pub total_outbound: u64,
    #[serde(default)]
    pub total_unknown: u64,
    #[serde(default)]
    pub total_letters: u64,
    #[serde(default)]
    pub per_day: BTreeMap<NaiveDate, DayCounts>,
    pub last_letter_ts: Option<DateTime<Utc>>,
    pub last_car_ts: Option<DateTime<Utc>>,
    pub last_direction: Option<Direction>,
}

impl Counters {
    pub fn car_total(&self) -> u64 {
        self.total_inbound + self.total_outbound
    }

    /// Counts for `date`, zero if nothing was recorded that day
    pub fn day(&self, date: NaiveDate) -> DayCounts {
        self.per_day.get(&date).copied().unwrap_or_default()
    }

    /// Most recent day with a bucket
    pub fn latest_day(&self) -> Option<NaiveDate> {
        self.per_day.keys().next_back().copied()
    }
}

/// Exclusive owner of the [`Counters`]
///
/// Events are bucketed by their local date in the configured timezone. A new
/// day's bucket is created by the first event dated on it; an event dated
/// before the newest bucket is counted in the newest bucket so closed days
/// never change.
#[derive(Debug)]
pub struct CounterStore {
    counters: Counters,
    timezone: Tz,
    last_vehicle_id: Option<u64>,
    last_letter_id: Option<u64>,
}

impl CounterStore {
    pub fn new(timezone: Tz) -> Self {
        Self::with_counters(Counters::default(), timezone)
    }

    /// Resume from previously persisted counters
    pub fn with_counters(counters: Counters, timezone: Tz) -> Self {
        Self {
            counters,
            timezone,
            last_vehicle_id: None,
            last_letter_id: None,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Local calendar date of `timestamp`
    pub fn local_date(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.timezone).date_naive()
    }

    pub fn snapshot(&self) -> Counters {
        self.counters.clone()
    }

    /// Returns false if this event was already recorded
    pub fn record_vehicle(&mut self, event: &VehicleEvent) -> bool {
        if matches!(self.last_vehicle_id, Some(last) if event.id <= last) {
            debug!("Vehicle event {} already recorded", event.id);
            return false;
        }
        self.last_vehicle_id = Some(event.id);

        let date = self.bucket_date(event.timestamp);
        let day = self.counters.per_day.entry(date).or_default();
        match event.direction {
            Direction::Inbound => {
                day.inbound += 1;
                self.counters.total_inbound += 1;
            }
            Direction::Outbound => {
                day.outbound += 1;
                self.counters.total_outbound += 1;
            }
            Direction::Unknown => {
                day.unknown += 1;
                self.counters.total_unknown += 1;
                return true;
            }
        }

        self.counters.last_car_ts = Some(event.timestamp);
        self.counters.last_direction = Some(event.direction);
        info!(
            "Counted {} vehicle on {} (total {})",
            event.direction,
            date,
            self.counters.car_total()
        );
        true
    }

    /// Returns false if this event was already recorded
    pub fn record_letter(&mut self, event: &LetterEvent) -> bool {
        if matches!(self.last_letter_id, Some(last) if event.id <= last) {
            debug!("Letter event {} already recorded", event.id);
            return false;
        }
        self.last_letter_id = Some(event.id);

        let date = self.bucket_date(event.timestamp);
        self.counters.per_day.entry(date).or_default().letters += 1;
        self.counters.total_letters += 1;
        self.counters.last_letter_ts = Some(event.timestamp);
        info!(
            "Counted letter on {} (total {})",
            date, self.counters.total_letters
        );
        true
    }

    fn bucket_date(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        let date = self.local_date(timestamp);
        match self.counters.latest_day() {
            Some(latest) if latest > date => {
                debug!("Event dated {} counted in open day {}", date, latest);
                latest
            }
            _ => date,
        }
    }
}
