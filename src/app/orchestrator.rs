use super::types::{ComponentState, ShutdownReason};
use crate::config::{InputSource, PostboxConfig};
use crate::counters::Counters;
use crate::dispatch::Input;
use crate::error::Result;
use crate::events::EventBus;
use crate::input::{KeyboardSource, SampleSource, SysfsGpioSource};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Main application coordinator that wires the sensor pipeline together
pub struct PostboxOrchestrator {
    pub(super) config: PostboxConfig,
    pub(super) event_bus: EventBus,

    // Input funnel
    pub(super) input_sender: mpsc::Sender<Input>,
    pub(super) input_receiver: Option<mpsc::Receiver<Input>>,

    // Components
    pub(super) source: Box<dyn SampleSource>,
    pub(super) playback_enabled: bool,
    pub(super) dispatcher_handle: Option<JoinHandle<Counters>>,
    pub(super) ticker_handle: Option<JoinHandle<()>>,
    pub(super) publisher_handles: Vec<(&'static str, JoinHandle<()>)>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    /// Stops the dispatcher and ticker
    pub(super) cancellation_token: CancellationToken,
    /// Stops publishers, cancelled last so they see the final events
    pub(super) publisher_token: CancellationToken,
}

impl PostboxOrchestrator {
    pub async fn new(config: PostboxConfig) -> Result<Self> {
        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let (input_sender, input_receiver) = mpsc::channel(config.input.input_queue_capacity);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let source = Self::build_source(&config, &event_bus);

        Ok(Self {
            config,
            event_bus,
            input_sender,
            input_receiver: Some(input_receiver),
            source,
            playback_enabled: true,
            dispatcher_handle: None,
            ticker_handle: None,
            publisher_handles: Vec::new(),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            publisher_token: CancellationToken::new(),
        })
    }

    fn build_source(config: &PostboxConfig, event_bus: &EventBus) -> Box<dyn SampleSource> {
        match config.input.source {
            InputSource::Gpio => Box::new(SysfsGpioSource::from_config(config)),
            InputSource::Keyboard => Box::new(KeyboardSource::new(event_bus.clone())),
        }
    }

    /// Replace the configured sensor source with the keyboard
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.config.input.source = if enabled {
            InputSource::Keyboard
        } else {
            InputSource::Gpio
        };
        self.source = Self::build_source(&self.config, &self.event_bus);
    }

    /// With playback disabled, clips are logged instead of played
    pub fn set_playback_enabled(&mut self, enabled: bool) {
        self.playback_enabled = enabled;
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &PostboxConfig {
        &self.config
    }

    /// Sender feeding the input queue
    pub fn input_sender(&self) -> mpsc::Sender<Input> {
        self.input_sender.clone()
    }
}
