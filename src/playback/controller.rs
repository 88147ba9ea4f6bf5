use super::backend::{PlaybackBackend, PlaybackCompletion, PlaybackOutcome};
use super::clips::{ClipLibrary, ClipRequest, Trigger};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Exactly one of these is active at any time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackState {
    /// Idle loop running, waiting for a trigger
    Idle,
    /// A triggered clip is on screen
    PlayingEvent { play_id: u64, trigger: Trigger },
    /// Outside show hours: no idle loop, triggers start nothing
    Suppressed,
}

impl PlaybackState {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::PlayingEvent { .. } => "playing_event",
            PlaybackState::Suppressed => "suppressed",
        }
    }
}

/// Decides what is on screen: the idle loop, an event clip, or nothing
///
/// While a clip plays, only the most recent further trigger is remembered
/// and played once the current clip ends. Backend failures are logged and
/// treated as a finished clip, so the controller always falls back to
/// `Idle` or `Suppressed`.
pub struct PlaybackController<B: PlaybackBackend> {
    backend: B,
    clips: ClipLibrary,
    state: PlaybackState,
    pending: Option<Trigger>,
    show_hours: bool,
    next_play_id: u64,
    failures: Vec<String>,
}

impl<B: PlaybackBackend> PlaybackController<B> {
    pub fn new(backend: B, clips: ClipLibrary) -> Self {
        Self {
            backend,
            clips,
            state: PlaybackState::Idle,
            pending: None,
            show_hours: true,
            next_play_id: 0,
            failures: Vec::new(),
        }
    }

    /// Bring the display into the state matching the current show hours
    pub fn start(&mut self, in_show_hours: bool) {
        self.show_hours = in_show_hours;
        if in_show_hours {
            self.enter_idle();
        } else {
            self.enter_suppressed();
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn pending(&self) -> Option<Trigger> {
        self.pending
    }

    pub fn in_show_hours(&self) -> bool {
        self.show_hours
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Failures since the last call, for reporting upward
    pub fn drain_failures(&mut self) -> Vec<String> {
        std::mem::take(&mut self.failures)
    }

    /// Handle a letter or vehicle trigger; returns whether a clip started or was queued
    pub fn trigger(&mut self, trigger: Trigger) -> bool {
        if matches!(trigger, Trigger::Vehicle(direction) if !direction.is_known()) {
            return false;
        }

        match self.state {
            PlaybackState::Suppressed => {
                debug!("Outside show hours, {} plays nothing", trigger);
                false
            }
            PlaybackState::Idle => {
                let Some(path) = self.clips.next_for(trigger) else {
                    debug!("No clip configured for {}", trigger);
                    return false;
                };
                if let Err(e) = self.backend.stop_idle() {
                    warn!("Failed to stop idle loop: {}", e);
                }
                self.begin(trigger, path);
                true
            }
            PlaybackState::PlayingEvent { play_id, .. } => {
                if !self.clips.has_clip_for(trigger) {
                    debug!("No clip configured for {}", trigger);
                    return false;
                }
                if let Some(dropped) = self.pending.replace(trigger) {
                    debug!("Pending {} replaced by {}", dropped, trigger);
                }
                debug!("Queued {} behind play {}", trigger, play_id);
                true
            }
        }
    }

    pub fn on_playback_finished(&mut self, completion: PlaybackCompletion) {
        let current = match self.state {
            PlaybackState::PlayingEvent { play_id, .. } => play_id,
            _ => {
                debug!(
                    "Ignoring completion of play {} while {}",
                    completion.play_id,
                    self.state.name()
                );
                return;
            }
        };
        if completion.play_id != current {
            debug!(
                "Ignoring stale completion of play {} (playing {})",
                completion.play_id, current
            );
            return;
        }

        match completion.outcome {
            PlaybackOutcome::Completed => debug!("Play {} finished", current),
            PlaybackOutcome::Failed { reason } => {
                error!("Play {} failed: {}", current, reason);
                self.failures.push(format!("play {} failed: {}", current, reason));
            }
            PlaybackOutcome::TimedOut => {
                error!("Play {} timed out", current);
                self.failures.push(format!("play {} timed out", current));
            }
        }

        self.finish();
    }

    pub fn set_show_hours(&mut self, active: bool) {
        if active == self.show_hours {
            return;
        }
        self.show_hours = active;
        info!(
            "Show hours {}",
            if active { "started" } else { "ended" }
        );

        match (self.state, active) {
            (PlaybackState::Suppressed, true) => self.enter_idle(),
            (PlaybackState::Idle, false) => self.enter_suppressed(),
            (PlaybackState::PlayingEvent { .. }, false) => {
                // The running clip ends normally and lands in Suppressed
                if let Some(dropped) = self.pending.take() {
                    debug!("Dropped pending {} at end of show hours", dropped);
                }
            }
            _ => {}
        }
    }

    /// Discard any pending trigger and stop the backend
    pub fn shutdown(&mut self) {
        if let Some(dropped) = self.pending.take() {
            debug!("Discarding pending {} on shutdown", dropped);
        }
        self.backend.shutdown();
    }

    fn begin(&mut self, trigger: Trigger, path: PathBuf) {
        let play_id = self.next_play_id;
        self.next_play_id += 1;

        let request = ClipRequest {
            play_id,
            trigger,
            path,
        };
        self.state = PlaybackState::PlayingEvent { play_id, trigger };
        info!("Playback: playing {} clip (play {})", trigger, play_id);

        if let Err(e) = self.backend.play(&request) {
            error!("Failed to start clip for {}: {}", trigger, e);
            self.failures.push(e.to_string());
            self.finish();
        }
    }

    fn finish(&mut self) {
        if !self.show_hours {
            self.pending = None;
            self.enter_suppressed();
            return;
        }

        if let Some(next) = self.pending.take() {
            if let Some(path) = self.clips.next_for(next) {
                self.begin(next, path);
                return;
            }
        }

        self.enter_idle();
    }

    fn enter_idle(&mut self) {
        self.state = PlaybackState::Idle;
        info!("Playback: idle");
        let idle = self.clips.idle_path();
        if let Err(e) = self.backend.start_idle(&idle) {
            warn!("Failed to start idle loop {}: {}", idle.display(), e);
        }
    }

    fn enter_suppressed(&mut self) {
        self.state = PlaybackState::Suppressed;
        info!("Playback: suppressed");
        if let Err(e) = self.backend.stop_idle() {
            warn!("Failed to stop idle loop: {}", e);
        }
    }
}
