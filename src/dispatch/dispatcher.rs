use super::Input;
use crate::config::{DirectionConfig, PostboxConfig};
use crate::counters::{CounterStore, Counters};
use crate::direction::{DirectionResolver, VehicleEvent};
use crate::error::Result;
use crate::events::{EventBus, PostboxEvent};
use crate::letter::{LetterDetector, LetterEvent};
use crate::playback::{
    ClipLibrary, PlaybackBackend, PlaybackController, PlaybackState, ShowHours, Trigger,
};
use crate::sensor::{Debouncer, Edge, SensorId};
use chrono::{DateTime, NaiveDate, Utc};
use std::ops::ControlFlow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Owns every state machine and applies inputs to them one at a time
pub struct Dispatcher<B: PlaybackBackend> {
    debouncer: Debouncer,
    resolver: DirectionResolver,
    letters: LetterDetector,
    playback: PlaybackController<B>,
    counters: CounterStore,
    show_hours: ShowHours,
    direction_config: DirectionConfig,
    bus: EventBus,
    current_day: Option<NaiveDate>,
    published_state: Option<PlaybackState>,
}

impl<B: PlaybackBackend> Dispatcher<B> {
    pub fn new(
        config: &PostboxConfig,
        backend: B,
        bus: EventBus,
        counters: Counters,
    ) -> Result<Self> {
        let timezone = config.timezone();
        Ok(Self {
            debouncer: Debouncer::from_millis(config.debounce.window_ms),
            resolver: DirectionResolver::from_config(&config.direction),
            letters: LetterDetector::from_config(&config.letter),
            playback: PlaybackController::new(backend, ClipLibrary::from_config(&config.playback)),
            counters: CounterStore::with_counters(counters, timezone),
            show_hours: ShowHours::from_config(&config.schedule, timezone)?,
            direction_config: config.direction.clone(),
            bus,
            current_day: None,
            published_state: None,
        })
    }

    pub fn playback(&self) -> &PlaybackController<B> {
        &self.playback
    }

    pub fn snapshot(&self) -> Counters {
        self.counters.snapshot()
    }

    /// Put the display into its initial state and announce the starting counters
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.playback.start(self.show_hours.contains(now));
        self.current_day = Some(self.counters.local_date(now));
        self.publish_counters(now);
        self.after_playback(now);
    }

    /// Apply one input; `Break` once shutdown has been processed
    pub fn handle(&mut self, input: Input) -> ControlFlow<()> {
        trace!("Dispatching {}", input.kind());
        match input {
            Input::Sample(sample) => {
                let now = sample.timestamp;
                self.advance(now);
                if let Some(edge) = self.debouncer.observe(sample) {
                    self.on_edge(edge);
                }
            }
            Input::Tick(now) => {
                self.advance(now);
                self.playback.set_show_hours(self.show_hours.contains(now));
                self.after_playback(now);
                self.check_rollover(now);
            }
            Input::PlaybackFinished(completion) => {
                self.playback.on_playback_finished(completion);
                self.after_playback(Utc::now());
            }
            Input::Shutdown { reason } => {
                self.shutdown(&reason);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Consume the input queue until shutdown, returning the final counters
    pub async fn run(
        mut self,
        mut inputs: mpsc::Receiver<Input>,
        cancellation_token: CancellationToken,
    ) -> Counters {
        self.start(Utc::now());
        info!("Dispatcher running");

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    self.shutdown("cancelled");
                    break;
                }
                input = inputs.recv() => match input {
                    Some(input) => {
                        if self.handle(input).is_break() {
                            break;
                        }
                    }
                    None => {
                        self.shutdown("input queue closed");
                        break;
                    }
                },
            }
        }

        self.counters.snapshot()
    }

    /// Confirm matured debounce candidates and expire stale pairing windows
    ///
    /// Confirmed edges are dated when their level first appeared, so a rise
    /// seen less than one debounce window ago may still land inside an open
    /// pairing window. Windows are only expired up to that horizon.
    fn advance(&mut self, now: DateTime<Utc>) {
        for edge in self.debouncer.poll(now) {
            self.on_edge(edge);
        }
        let horizon = now - self.debouncer.window();
        if let Some(event) = self.resolver.expire(horizon) {
            self.on_vehicle(event);
        }
    }

    fn on_edge(&mut self, edge: Edge) {
        debug!("Edge {:?} on {} at {}", edge.kind, edge.sensor, edge.timestamp);
        match edge.sensor {
            SensorId::Letter => {
                if let Some(event) = self.letters.observe(edge) {
                    self.on_letter(event);
                }
            }
            SensorId::BeamA | SensorId::BeamB => {
                if let Some(event) = self.resolver.observe(edge) {
                    self.on_vehicle(event);
                }
            }
        }
    }

    fn on_letter(&mut self, event: LetterEvent) {
        if !self.counters.record_letter(&event) {
            return;
        }
        self.publish(PostboxEvent::LetterDropped { event });
        self.publish_counters(event.timestamp);

        self.playback.trigger(Trigger::Letter);
        self.after_playback(event.timestamp);
    }

    fn on_vehicle(&mut self, event: VehicleEvent) {
        if !self.counters.record_vehicle(&event) {
            return;
        }
        info!(
            "Vehicle {} passed: {} ({:?})",
            event.id,
            event.direction.label(&self.direction_config),
            event.order
        );
        let label = event.direction.label(&self.direction_config).to_string();
        self.publish(PostboxEvent::VehiclePassed { event, label });
        self.publish_counters(event.timestamp);

        self.playback.trigger(Trigger::Vehicle(event.direction));
        self.after_playback(event.timestamp);
    }

    /// Report failures and state changes from the playback controller
    fn after_playback(&mut self, now: DateTime<Utc>) {
        for failure in self.playback.drain_failures() {
            self.publish(PostboxEvent::SystemError {
                component: "playback".to_string(),
                error: failure,
            });
        }

        let state = self.playback.state();
        if self.published_state != Some(state) {
            self.published_state = Some(state);
            self.publish(PostboxEvent::PlaybackStateChanged {
                state,
                timestamp: now,
            });
        }
    }

    fn check_rollover(&mut self, now: DateTime<Utc>) {
        let today = self.counters.local_date(now);
        if matches!(self.current_day, Some(day) if day >= today) {
            return;
        }
        info!("New day {}", today);
        self.publish_counters(now);
    }

    fn publish_counters(&mut self, now: DateTime<Utc>) {
        let today = self.counters.local_date(now);
        let today = match self.current_day {
            Some(day) if day > today => day,
            _ => today,
        };
        self.current_day = Some(today);
        self.publish(PostboxEvent::CountersUpdated {
            counters: self.counters.snapshot(),
            today,
            timestamp: now,
        });
    }

    fn publish(&self, event: PostboxEvent) {
        if let Err(e) = self.bus.publish(event) {
            debug!("Event not delivered: {}", e);
        }
    }

    fn shutdown(&mut self, reason: &str) {
        info!("Dispatcher stopping: {}", reason);
        if self.resolver.discard() {
            debug!("Discarded open pairing window");
        }
        self.playback.shutdown();
    }
}
