use super::{PostboxOrchestrator, ShutdownReason};
use crate::error::{PostboxError, Result};
use crate::events::{EventFilter, PostboxEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

type SharedShutdown = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

async fn request_shutdown(sender: &SharedShutdown, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}

impl PostboxOrchestrator {
    /// Run until a signal or a shutdown request arrives, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Postbox system is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| PostboxError::system("Shutdown sender already taken"))?;
        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| PostboxError::system("Shutdown receiver already taken"))?;

        let shutdown_sender: SharedShutdown = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(&shutdown_sender);
        self.setup_event_handler(&shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| PostboxError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {}", shutdown_reason);

        let exit_code = self.shutdown(&shutdown_reason).await?;

        info!("Postbox system shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: &SharedShutdown) {
        // SIGTERM (systemd stop)
        #[cfg(unix)]
        {
            let shutdown_sender = Arc::clone(shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    request_shutdown(
                        &shutdown_sender,
                        ShutdownReason::Signal("SIGTERM".to_string()),
                    )
                    .await;
                }
            });
        }

        // SIGINT (Ctrl+C)
        let shutdown_sender = Arc::clone(shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                request_shutdown(&shutdown_sender, ShutdownReason::Signal("SIGINT".to_string()))
                    .await;
            }
        });
    }

    /// Turn `ShutdownRequested` events on the bus into a shutdown
    fn setup_event_handler(&self, shutdown_sender: &SharedShutdown) {
        let shutdown_sender = Arc::clone(shutdown_sender);
        let mut receiver = self.event_bus.receiver(
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "shutdown",
        );
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(PostboxEvent::ShutdownRequested { reason, .. }) => {
                            request_shutdown(&shutdown_sender, ShutdownReason::UserRequest(reason))
                                .await;
                            break;
                        }
                        Ok(_) => {}
                        Err(crate::error::EventBusError::Lagged { .. }) => {}
                        Err(_) => break,
                    },
                }
            }
        });
    }
}
