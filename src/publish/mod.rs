//! Sinks consuming the outbound event bus
//!
//! Each publisher runs in its own task with its own filtered receiver, so a
//! slow or failing sink never holds up the dispatcher. Publish failures are
//! logged and otherwise ignored.

pub mod log;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod persist;
pub mod topics;

#[cfg(test)]
mod tests;

use crate::error::{EventBusError, Result};
use crate::events::{EventBus, EventFilter, EventReceiver, PostboxEvent};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use self::log::LogPublisher;
#[cfg(feature = "mqtt")]
pub use self::mqtt::MqttPublisher;
pub use persist::CounterPersister;
pub use topics::{MqttMessage, TopicLayout};

#[async_trait]
pub trait Publisher: Send {
    fn name(&self) -> &'static str;

    /// Events this publisher wants to see
    fn filter(&self) -> EventFilter {
        EventFilter::All
    }

    async fn publish(&mut self, event: &PostboxEvent) -> Result<()>;

    /// Flush and disconnect before shutdown
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Subscribe `publisher` to the bus and drive it on a new task
///
/// The subscription is taken before this returns, so no event published
/// afterwards is missed.
pub fn spawn_publisher<P>(
    publisher: P,
    bus: &EventBus,
    cancellation_token: CancellationToken,
) -> JoinHandle<()>
where
    P: Publisher + 'static,
{
    let receiver = bus.receiver(publisher.filter(), publisher.name());
    tokio::spawn(run_publisher(publisher, receiver, cancellation_token))
}

pub async fn run_publisher<P: Publisher>(
    mut publisher: P,
    mut receiver: EventReceiver,
    cancellation_token: CancellationToken,
) {
    info!("Publisher '{}' started", publisher.name());

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                debug!("Publisher '{}' cancelled", publisher.name());
                break;
            }
            event = receiver.recv() => match event {
                Ok(event) => {
                    if let Err(e) = publisher.publish(&event).await {
                        warn!(
                            "Publisher '{}' failed on {}: {}",
                            publisher.name(),
                            event.event_type(),
                            e
                        );
                    }
                }
                Err(EventBusError::Lagged { .. }) => continue,
                Err(_) => {
                    debug!("Event bus closed for publisher '{}'", publisher.name());
                    break;
                }
            },
        }
    }

    // Deliver anything that was already queued when we were asked to stop
    loop {
        match receiver.try_recv() {
            Ok(Some(event)) => {
                if let Err(e) = publisher.publish(&event).await {
                    warn!("Publisher '{}' failed while draining: {}", publisher.name(), e);
                }
            }
            // The receiver resumes at the oldest retained event
            Err(EventBusError::Lagged { .. }) => continue,
            Ok(None) | Err(_) => break,
        }
    }

    if let Err(e) = publisher.close().await {
        warn!("Publisher '{}' failed to close: {}", publisher.name(), e);
    }
    info!("Publisher '{}' stopped", publisher.name());
}
