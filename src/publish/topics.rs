//! Topic layout for the MQTT state sink
//!
//! State topics carry plain strings so that dashboards can use them
//! directly; event topics carry JSON.

use crate::events::PostboxEvent;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl MqttMessage {
    fn new(topic: String, payload: impl Into<String>, retain: bool) -> Self {
        Self {
            topic,
            payload: payload.into(),
            retain,
        }
    }
}

/// Maps events onto topics under a base prefix
#[derive(Debug, Clone)]
pub struct TopicLayout {
    base: String,
    timezone: Tz,
}

impl TopicLayout {
    pub fn new(base: impl Into<String>, timezone: Tz) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            timezone,
        }
    }

    pub fn status(&self) -> String {
        format!("{}/status", self.base)
    }

    pub fn state(&self, name: &str) -> String {
        format!("{}/state/{}", self.base, name)
    }

    pub fn event(&self, kind: &str) -> String {
        format!("{}/event/{}", self.base, kind)
    }

    /// Retained availability message
    pub fn online(&self) -> MqttMessage {
        MqttMessage::new(self.status(), ONLINE, true)
    }

    pub fn offline(&self) -> MqttMessage {
        MqttMessage::new(self.status(), OFFLINE, true)
    }

    /// Resets the momentary letter sensor after a drop
    pub fn letter_released(&self) -> MqttMessage {
        MqttMessage::new(self.state("letter"), "OFF", false)
    }

    fn iso(&self, timestamp: DateTime<Utc>) -> String {
        timestamp.with_timezone(&self.timezone).to_rfc3339()
    }

    pub fn messages_for(&self, event: &PostboxEvent) -> Vec<MqttMessage> {
        match event {
            PostboxEvent::LetterDropped { event } => vec![
                MqttMessage::new(self.state("letter"), "ON", false),
                MqttMessage::new(self.state("last_letter"), self.iso(event.timestamp), true),
                MqttMessage::new(
                    self.event("letter"),
                    json!({ "id": event.id, "timestamp": self.iso(event.timestamp) }).to_string(),
                    false,
                ),
            ],
            PostboxEvent::VehiclePassed { event, label } => {
                let mut messages = Vec::with_capacity(3);
                if event.direction.is_known() {
                    messages.push(MqttMessage::new(
                        self.state("last_car_time"),
                        self.iso(event.timestamp),
                        true,
                    ));
                    messages.push(MqttMessage::new(
                        self.state("last_dir"),
                        label.clone(),
                        false,
                    ));
                }
                messages.push(MqttMessage::new(
                    self.event("car"),
                    json!({
                        "id": event.id,
                        "direction": event.direction,
                        "label": label,
                        "order": event.order,
                        "timestamp": self.iso(event.timestamp),
                    })
                    .to_string(),
                    false,
                ));
                messages
            }
            PostboxEvent::CountersUpdated {
                counters, today, ..
            } => {
                let day = counters.day(*today);
                vec![
                    MqttMessage::new(
                        self.state("car_total"),
                        counters.car_total().to_string(),
                        true,
                    ),
                    MqttMessage::new(self.state("car_today"), day.cars().to_string(), false),
                    MqttMessage::new(
                        self.state("inbound_today"),
                        day.inbound.to_string(),
                        false,
                    ),
                    MqttMessage::new(
                        self.state("outbound_today"),
                        day.outbound.to_string(),
                        false,
                    ),
                    MqttMessage::new(
                        self.state("letter_total"),
                        counters.total_letters.to_string(),
                        true,
                    ),
                ]
            }
            PostboxEvent::PlaybackStateChanged { state, .. } => vec![MqttMessage::new(
                self.state("playback"),
                state.name(),
                false,
            )],
            PostboxEvent::SystemError { .. } | PostboxEvent::ShutdownRequested { .. } => {
                Vec::new()
            }
        }
    }
}
