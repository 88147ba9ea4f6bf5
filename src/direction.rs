use crate::config::DirectionConfig;
use crate::sensor::{Edge, EdgeKind, SensorId};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Travel direction of a vehicle past the two beams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
    /// Only one beam saw the vehicle
    Unknown,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Inbound => Direction::Outbound,
            Direction::Outbound => Direction::Inbound,
            Direction::Unknown => Direction::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Direction::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
            Direction::Unknown => "unknown",
        }
    }

    /// Friendly label configured for this direction
    pub fn label<'a>(&self, config: &'a DirectionConfig) -> &'a str {
        match self {
            Direction::Inbound => &config.label_inbound,
            Direction::Outbound => &config.label_outbound,
            Direction::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which beam broke first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeamOrder {
    AB,
    BA,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Beam {
    A,
    B,
}

impl Beam {
    fn from_sensor(sensor: SensorId) -> Option<Beam> {
        match sensor {
            SensorId::BeamA => Some(Beam::A),
            SensorId::BeamB => Some(Beam::B),
            SensorId::Letter => None,
        }
    }
}

/// A vehicle passing the beams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleEvent {
    /// Monotonic per-resolver sequence number
    pub id: u64,
    pub direction: Direction,
    /// Beam order for paired detections, `None` for single-beam ones
    pub order: Option<BeamOrder>,
    /// Second rise for paired detections, the lone rise otherwise
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct PairingWindow {
    first: Beam,
    opened: DateTime<Utc>,
}

/// Pairs beam-A/beam-B rises into directional vehicle events
///
/// At most one pairing window is open at a time. A rise on the other beam
/// inside the window classifies the vehicle; a window that expires, or that
/// is superseded by a fresh rise on the same beam, yields `Unknown`.
#[derive(Debug)]
pub struct DirectionResolver {
    window: ChronoDuration,
    cooldown: ChronoDuration,
    a_then_b: Direction,
    occluded_a: bool,
    occluded_b: bool,
    pending: Option<PairingWindow>,
    last_classified: Option<DateTime<Utc>>,
    next_id: u64,
}

impl DirectionResolver {
    pub fn new(window: ChronoDuration, a_then_b: Direction) -> Self {
        Self {
            window,
            cooldown: ChronoDuration::zero(),
            a_then_b,
            occluded_a: false,
            occluded_b: false,
            pending: None,
            last_classified: None,
            next_id: 0,
        }
    }

    pub fn from_config(config: &DirectionConfig) -> Self {
        Self::new(
            ChronoDuration::milliseconds(config.pairing_window_ms as i64),
            config.a_then_b,
        )
        .with_cooldown(ChronoDuration::milliseconds(
            config.vehicle_cooldown_ms as i64,
        ))
    }

    /// Ignore rises for `cooldown` after each classified vehicle
    pub fn with_cooldown(mut self, cooldown: ChronoDuration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Direction reported for a given beam order
    pub fn direction_for(&self, order: BeamOrder) -> Direction {
        match order {
            BeamOrder::AB => self.a_then_b,
            BeamOrder::BA => self.a_then_b.opposite(),
        }
    }

    pub fn has_open_window(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed a debounced beam edge
    pub fn observe(&mut self, edge: Edge) -> Option<VehicleEvent> {
        let beam = Beam::from_sensor(edge.sensor)?;

        match edge.kind {
            EdgeKind::Falling => {
                self.set_occluded(beam, false);
                None
            }
            EdgeKind::Rising => self.on_rise(beam, edge.timestamp),
        }
    }

    /// Close a pairing window that has outlived its duration
    pub fn expire(&mut self, now: DateTime<Utc>) -> Option<VehicleEvent> {
        let pending = self.pending?;
        if now - pending.opened <= self.window {
            return None;
        }
        self.pending = None;
        debug!("Pairing window from beam {:?} expired", pending.first);
        Some(self.unknown(pending))
    }

    /// Drop any open window without emitting
    pub fn discard(&mut self) -> bool {
        self.pending.take().is_some()
    }

    fn on_rise(&mut self, beam: Beam, at: DateTime<Utc>) -> Option<VehicleEvent> {
        if self.is_occluded(beam) {
            debug!("Beam {:?} rose again without falling, ignoring", beam);
            return None;
        }
        self.set_occluded(beam, true);

        if let Some(last) = self.last_classified {
            if self.cooldown > ChronoDuration::zero() && at - last < self.cooldown {
                debug!("Beam {:?} rise within vehicle cooldown, ignoring", beam);
                return None;
            }
        }

        let fresh = PairingWindow {
            first: beam,
            opened: at,
        };

        match self.pending.take() {
            None => {
                self.pending = Some(fresh);
                None
            }
            Some(pending) if at - pending.opened > self.window => {
                self.pending = Some(fresh);
                Some(self.unknown(pending))
            }
            Some(pending) if pending.first == beam => {
                debug!("Beam {:?} rose again inside its window, abandoning it", beam);
                self.pending = Some(fresh);
                Some(self.unknown(pending))
            }
            Some(pending) => {
                let order = match pending.first {
                    Beam::A => BeamOrder::AB,
                    Beam::B => BeamOrder::BA,
                };
                let direction = self.direction_for(order);
                self.last_classified = Some(at);
                let event = VehicleEvent {
                    id: self.take_id(),
                    direction,
                    order: Some(order),
                    timestamp: at,
                };
                info!(
                    "Vehicle {} ({:?}, {} ms between beams)",
                    direction,
                    order,
                    (at - pending.opened).num_milliseconds()
                );
                Some(event)
            }
        }
    }

    fn unknown(&mut self, pending: PairingWindow) -> VehicleEvent {
        info!("Vehicle direction unknown (beam {:?} only)", pending.first);
        VehicleEvent {
            id: self.take_id(),
            direction: Direction::Unknown,
            order: None,
            timestamp: pending.opened,
        }
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn is_occluded(&self, beam: Beam) -> bool {
        match beam {
            Beam::A => self.occluded_a,
            Beam::B => self.occluded_b,
        }
    }

    fn set_occluded(&mut self, beam: Beam, occluded: bool) {
        match beam {
            Beam::A => self.occluded_a = occluded,
            Beam::B => self.occluded_b = occluded,
        }
    }
}
