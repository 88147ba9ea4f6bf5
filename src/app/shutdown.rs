use super::{ComponentState, PostboxOrchestrator, ShutdownReason};
use crate::counters::CounterFile;
use crate::dispatch::Input;
use crate::error::{PostboxError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const SOURCE_STOP_TIMEOUT: Duration = Duration::from_secs(2);
const DISPATCHER_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const PUBLISHER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl PostboxOrchestrator {
    /// Stop producers first, then the dispatcher, then the publishers
    pub async fn shutdown(&mut self, reason: &ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");
        let mut exit_code = 0;

        let source = self.source.as_ref();
        let stopped = self
            .stop_component("input", SOURCE_STOP_TIMEOUT, async {
                source.stop().await
            })
            .await;
        if stopped.is_err() {
            exit_code = 1;
        }

        if let Some(handle) = self.ticker_handle.take() {
            handle.abort();
            self.set_component_state("ticker", ComponentState::Stopped)
                .await;
        }

        let mut final_counters = None;
        if let Some(handle) = self.dispatcher_handle.take() {
            let sender = self.input_sender.clone();
            let token = self.cancellation_token.clone();
            let reason = reason.to_string();
            let stopped = self
                .stop_component("dispatcher", DISPATCHER_STOP_TIMEOUT, async move {
                    if sender.send(Input::Shutdown { reason }).await.is_err() {
                        token.cancel();
                    }
                    handle
                        .await
                        .map_err(|e| PostboxError::component("dispatcher", e.to_string()))
                })
                .await;
            match stopped {
                Ok(counters) => {
                    info!(
                        "Final counters: {} inbound, {} outbound, {} letters",
                        counters.total_inbound, counters.total_outbound, counters.total_letters
                    );
                    final_counters = Some(counters);
                }
                Err(_) => exit_code = 1,
            }
        }
        self.cancellation_token.cancel();

        self.publisher_token.cancel();
        let handles = std::mem::take(&mut self.publisher_handles);
        let stopped = self
            .stop_component("publishers", PUBLISHER_STOP_TIMEOUT, async move {
                for (name, handle) in handles {
                    handle
                        .await
                        .map_err(|e| PostboxError::component(name, e.to_string()))?;
                }
                Ok(())
            })
            .await;
        if stopped.is_err() {
            exit_code = 1;
        }

        // Publishers are stopped, so nothing races this final save
        if let (Some(counters), Some(path)) = (final_counters, self.config.counters_path()) {
            if let Err(e) = CounterFile::new(path).save(&counters).await {
                error!("Failed to save final counters: {}", e);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component<F, T>(&self, component: &str, limit: Duration, stop: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, stop).await {
            Ok(Ok(value)) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Error stopping {} component: {}", component, e);
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                Err(PostboxError::component(
                    component,
                    format!("stop timed out after {:?}", limit),
                ))
            }
        }
    }
}
