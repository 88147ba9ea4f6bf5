use crate::config::LetterConfig;
use crate::sensor::{Edge, EdgeKind, SensorId};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A letter dropped through the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterEvent {
    /// Monotonic per-detector sequence number
    pub id: u64,
    pub timestamp: DateTime<Utc>,
}

/// Turns letter-sensor edges into drop events with a re-arm cooldown
#[derive(Debug)]
pub struct LetterDetector {
    trigger: EdgeKind,
    cooldown: ChronoDuration,
    last_drop: Option<DateTime<Utc>>,
    next_id: u64,
}

impl LetterDetector {
    pub fn new(trigger: EdgeKind, cooldown: ChronoDuration) -> Self {
        Self {
            trigger,
            cooldown,
            last_drop: None,
            next_id: 0,
        }
    }

    pub fn from_config(config: &LetterConfig) -> Self {
        Self::new(
            config.trigger_edge,
            ChronoDuration::milliseconds(config.cooldown_ms as i64),
        )
    }

    /// Whether an edge at `now` would be accepted
    pub fn is_armed(&self, now: DateTime<Utc>) -> bool {
        match self.last_drop {
            Some(last) => now - last >= self.cooldown,
            None => true,
        }
    }

    pub fn observe(&mut self, edge: Edge) -> Option<LetterEvent> {
        if edge.sensor != SensorId::Letter || edge.kind != self.trigger {
            return None;
        }

        if !self.is_armed(edge.timestamp) {
            debug!("Letter edge at {} ignored (cooldown)", edge.timestamp);
            return None;
        }

        self.last_drop = Some(edge.timestamp);
        let event = LetterEvent {
            id: self.next_id,
            timestamp: edge.timestamp,
        };
        self.next_id += 1;
        info!("Letter dropped at {}", edge.timestamp);
        Some(event)
    }
}
