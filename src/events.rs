use crate::counters::Counters;
use crate::direction::VehicleEvent;
use crate::error::EventBusError;
use crate::letter::LetterEvent;
use crate::playback::PlaybackState;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Notifications leaving the core for publishers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PostboxEvent {
    /// A letter went through the slot
    LetterDropped { event: LetterEvent },
    /// A vehicle passed the beams
    VehiclePassed { event: VehicleEvent, label: String },
    /// Counters changed, or a new local day started
    CountersUpdated {
        counters: Counters,
        today: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    /// The playback controller changed state
    PlaybackStateChanged {
        state: PlaybackState,
        timestamp: DateTime<Utc>,
    },
    /// A non-fatal failure in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: DateTime<Utc>,
        reason: String,
    },
}

impl PostboxEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PostboxEvent::LetterDropped { event } => event.timestamp,
            PostboxEvent::VehiclePassed { event, .. } => event.timestamp,
            PostboxEvent::CountersUpdated { timestamp, .. } => *timestamp,
            PostboxEvent::PlaybackStateChanged { timestamp, .. } => *timestamp,
            PostboxEvent::SystemError { .. } => Utc::now(),
            PostboxEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            PostboxEvent::LetterDropped { event } => format!("Letter {} dropped", event.id),
            PostboxEvent::VehiclePassed { event, label } => {
                format!("Vehicle {} passed ({})", event.id, label)
            }
            PostboxEvent::CountersUpdated {
                counters, today, ..
            } => format!(
                "Counters updated: {} cars, {} letters, {} today",
                counters.car_total(),
                counters.total_letters,
                counters.day(*today).cars()
            ),
            PostboxEvent::PlaybackStateChanged { state, .. } => {
                format!("Playback {}", state.name())
            }
            PostboxEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            PostboxEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PostboxEvent::LetterDropped { .. } => "letter_dropped",
            PostboxEvent::VehiclePassed { .. } => "vehicle_passed",
            PostboxEvent::CountersUpdated { .. } => "counters_updated",
            PostboxEvent::PlaybackStateChanged { .. } => "playback_state_changed",
            PostboxEvent::SystemError { .. } => "system_error",
            PostboxEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast bus carrying [`PostboxEvent`]s to publishers
///
/// Publishing never waits on subscribers; a subscriber that falls behind
/// loses the oldest events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PostboxEvent>,
    debug_logging: bool,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PostboxEvent> {
        self.sender.subscribe()
    }

    /// Subscribe through a filter
    pub fn receiver(&self, filter: EventFilter, name: impl Into<String>) -> EventReceiver {
        EventReceiver::new(self.subscribe(), filter, name.into())
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: PostboxEvent) -> Result<usize, EventBusError> {
        match &event {
            PostboxEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            PostboxEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Publishing event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept `SystemError` events from specific components
    Components(Vec<String>),
    Custom(fn(&PostboxEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &PostboxEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Components(components) => {
                if let PostboxEvent::SystemError { component, .. } = event {
                    components.contains(component)
                } else {
                    false
                }
            }
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Named, filtered view of the bus
pub struct EventReceiver {
    receiver: broadcast::Receiver<PostboxEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<PostboxEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next event passing the filter
    pub async fn recv(&mut self) -> Result<PostboxEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<PostboxEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
