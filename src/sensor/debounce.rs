use super::types::{Edge, EdgeKind, RawSample, SensorId};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
struct Candidate {
    level: bool,
    since: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct SensorState {
    stable: bool,
    candidate: Option<Candidate>,
}

/// Turns noisy level samples into clean edges
///
/// A level change becomes a candidate; it is confirmed once the new level has
/// held for at least `window` with no intervening flip. Any flip back before
/// that discards the candidate. Confirmation happens either on a later sample
/// or on [`Debouncer::poll`], so interrupt-style sources that only report
/// changes still produce edges.
#[derive(Debug)]
pub struct Debouncer {
    window: ChronoDuration,
    sensors: BTreeMap<SensorId, SensorState>,
}

impl Debouncer {
    pub fn new(window: ChronoDuration) -> Self {
        Self {
            window,
            sensors: BTreeMap::new(),
        }
    }

    pub fn from_millis(window_ms: u64) -> Self {
        Self::new(ChronoDuration::milliseconds(window_ms as i64))
    }

    pub fn window(&self) -> ChronoDuration {
        self.window
    }

    /// Feed one raw sample, returning an edge if a candidate was confirmed
    pub fn observe(&mut self, sample: RawSample) -> Option<Edge> {
        let window = self.window;
        if !self.sensors.contains_key(&sample.sensor) {
            // First sample is the power-on baseline
            debug!(
                "Baseline for {}: {}",
                sample.sensor,
                if sample.level { "active" } else { "inactive" }
            );
            self.sensors.insert(
                sample.sensor,
                SensorState {
                    stable: sample.level,
                    candidate: None,
                },
            );
            return None;
        }
        let state = self.sensors.get_mut(&sample.sensor)?;

        let mut edge = None;
        if let Some(candidate) = state.candidate {
            if sample.timestamp - candidate.since >= window {
                edge = Some(confirm(sample.sensor, state, candidate));
            }
        }

        if sample.level == state.stable {
            if state.candidate.take().is_some() {
                trace!("Discarded bounce on {}", sample.sensor);
            }
        } else if state.candidate.is_none() {
            state.candidate = Some(Candidate {
                level: sample.level,
                since: sample.timestamp,
            });
        }

        edge
    }

    /// Confirm every candidate that has been stable for the whole window by `now`
    ///
    /// Edges are returned in timestamp order.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<Edge> {
        let window = self.window;
        let mut edges: Vec<Edge> = self
            .sensors
            .iter_mut()
            .filter_map(|(sensor, state)| {
                let candidate = state.candidate?;
                (now - candidate.since >= window).then(|| confirm(*sensor, state, candidate))
            })
            .collect();
        edges.sort_by_key(|edge| edge.timestamp);
        edges
    }

    /// Last confirmed level of a sensor, if a baseline has been seen
    pub fn stable_level(&self, sensor: SensorId) -> Option<bool> {
        self.sensors.get(&sensor).map(|state| state.stable)
    }

    /// Whether a sensor has an unconfirmed level change
    pub fn has_candidate(&self, sensor: SensorId) -> bool {
        self.sensors
            .get(&sensor)
            .map(|state| state.candidate.is_some())
            .unwrap_or(false)
    }
}

fn confirm(sensor: SensorId, state: &mut SensorState, candidate: Candidate) -> Edge {
    state.stable = candidate.level;
    state.candidate = None;
    let edge = Edge {
        sensor,
        kind: EdgeKind::towards(candidate.level),
        timestamp: candidate.since,
    };
    debug!("Edge {:?} on {} at {}", edge.kind, sensor, edge.timestamp);
    edge
}
