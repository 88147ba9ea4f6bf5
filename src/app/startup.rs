use super::{ComponentState, PostboxOrchestrator};
use crate::counters::{CounterFile, Counters};
use crate::dispatch::{spawn_ticker, Dispatcher};
use crate::error::{PostboxError, Result};
use crate::playback::{MpvBackend, PlaybackBackend, RecordingBackend};
use crate::publish::{spawn_publisher, CounterPersister, LogPublisher};
use tracing::{error, info};

pub(super) const COMPONENTS: [&str; 4] = ["publishers", "dispatcher", "ticker", "input"];

impl PostboxOrchestrator {
    /// Register all components as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing postbox components");

        let mut states = self.component_states.lock().await;
        for component in COMPONENTS {
            states.insert(component.to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start components consumers first, so nothing produced is missed
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting postbox system");

        let counters = self.load_counters().await?;

        self.set_component_state("publishers", ComponentState::Starting)
            .await;
        self.start_publishers();
        self.set_component_state("publishers", ComponentState::Running)
            .await;

        self.set_component_state("dispatcher", ComponentState::Starting)
            .await;
        if self.playback_enabled {
            let backend = MpvBackend::from_config(&self.config.playback, self.input_sender.clone());
            self.start_dispatcher(backend, counters)?;
        } else {
            info!("Playback disabled, clips will only be logged");
            self.start_dispatcher(RecordingBackend::new(), counters)?;
        }
        self.set_component_state("dispatcher", ComponentState::Running)
            .await;

        self.set_component_state("ticker", ComponentState::Starting)
            .await;
        self.ticker_handle = Some(spawn_ticker(
            self.input_sender.clone(),
            self.config.tick_interval(),
            self.cancellation_token.child_token(),
        ));
        self.set_component_state("ticker", ComponentState::Running)
            .await;

        self.set_component_state("input", ComponentState::Starting)
            .await;
        self.source
            .start(self.input_sender.clone())
            .await
            .map_err(|e| {
                error!("Failed to start {} source: {}", self.source.name(), e);
                e
            })?;
        self.set_component_state("input", ComponentState::Running)
            .await;
        info!("Sensor source '{}' started", self.source.name());

        info!("Postbox system started successfully");
        Ok(())
    }

    async fn load_counters(&self) -> Result<Counters> {
        match self.config.counters_path() {
            Some(path) => CounterFile::new(path).load().await.map_err(|e| {
                error!("Failed to load counters: {}", e);
                e
            }),
            None => Ok(Counters::default()),
        }
    }

    fn start_publishers(&mut self) {
        let token = self.publisher_token.clone();

        self.publisher_handles.push((
            "log",
            spawn_publisher(
                LogPublisher::new(self.config.timezone()),
                &self.event_bus,
                token.clone(),
            ),
        ));

        if let Some(path) = self.config.counters_path() {
            info!("Persisting counters to {}", path.display());
            self.publisher_handles.push((
                "counter_file",
                spawn_publisher(
                    CounterPersister::new(CounterFile::new(path)),
                    &self.event_bus,
                    token.clone(),
                ),
            ));
        }

        if self.config.mqtt.enabled {
            #[cfg(feature = "mqtt")]
            {
                let publisher =
                    crate::publish::MqttPublisher::new(&self.config.mqtt, self.config.timezone());
                self.publisher_handles.push((
                    "mqtt",
                    spawn_publisher(publisher, &self.event_bus, token.clone()),
                ));
            }
            #[cfg(not(feature = "mqtt"))]
            tracing::warn!("MQTT is enabled in the configuration but this build lacks the 'mqtt' feature");
        }
    }

    fn start_dispatcher<B>(&mut self, backend: B, counters: Counters) -> Result<()>
    where
        B: PlaybackBackend + 'static,
    {
        let receiver = self
            .input_receiver
            .take()
            .ok_or_else(|| PostboxError::system("Input receiver already taken"))?;
        let dispatcher = Dispatcher::new(&self.config, backend, self.event_bus.clone(), counters)?;
        let token = self.cancellation_token.child_token();
        self.dispatcher_handle = Some(tokio::spawn(dispatcher.run(receiver, token)));
        Ok(())
    }
}
