use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three physical inputs the controller watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorId {
    Letter,
    BeamA,
    BeamB,
}

impl SensorId {
    pub const ALL: [SensorId; 3] = [SensorId::Letter, SensorId::BeamA, SensorId::BeamB];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorId::Letter => "letter",
            SensorId::BeamA => "beam_a",
            SensorId::BeamB => "beam_b",
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single level reading, `true` meaning the sensor is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub sensor: SensorId,
    pub level: bool,
    pub timestamp: DateTime<Utc>,
}

impl RawSample {
    pub fn new(sensor: SensorId, level: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor,
            level,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Rising,
    Falling,
}

impl EdgeKind {
    /// Edge produced by moving to `level`
    pub fn towards(level: bool) -> Self {
        if level {
            EdgeKind::Rising
        } else {
            EdgeKind::Falling
        }
    }
}

/// A debounced level change
///
/// `timestamp` is when the new level first appeared, not when it was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub sensor: SensorId,
    pub kind: EdgeKind,
    pub timestamp: DateTime<Utc>,
}

impl Edge {
    pub fn is_rising(&self) -> bool {
        self.kind == EdgeKind::Rising
    }
}
