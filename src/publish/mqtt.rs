use super::topics::{MqttMessage, TopicLayout, OFFLINE};
use super::Publisher;
use crate::config::MqttConfig;
use crate::error::{PostboxError, Result};
use crate::events::PostboxEvent;
use async_trait::async_trait;
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long the letter state topic reads `ON` after a drop
const LETTER_PULSE: Duration = Duration::from_millis(200);

/// Publishes state and events to an MQTT broker
///
/// The client reconnects on its own; while disconnected, publishes queue in
/// the client up to its capacity and are dropped beyond that.
pub struct MqttPublisher {
    client: AsyncClient,
    layout: TopicLayout,
    eventloop: JoinHandle<()>,
}

impl MqttPublisher {
    pub fn new(config: &MqttConfig, timezone: Tz) -> Self {
        let layout = TopicLayout::new(config.base.clone(), timezone);

        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);
        options.set_last_will(LastWill::new(
            layout.status(),
            OFFLINE,
            QoS::AtMostOnce,
            true,
        ));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);

        let online = layout.online();
        let announce = client.clone();
        let eventloop = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                        if let Err(e) = announce
                            .try_publish(&online.topic, QoS::AtMostOnce, online.retain, online.payload.clone())
                        {
                            warn!("Failed to announce availability: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        info!(
            "MQTT publisher for {}:{} under '{}'",
            config.host, config.port, config.base
        );
        Self {
            client,
            layout,
            eventloop,
        }
    }

    async fn send(&self, message: &MqttMessage) -> Result<()> {
        self.client
            .publish(
                &message.topic,
                QoS::AtMostOnce,
                message.retain,
                message.payload.clone(),
            )
            .await
            .map_err(|e| PostboxError::component("mqtt", e.to_string()))
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn publish(&mut self, event: &PostboxEvent) -> Result<()> {
        for message in self.layout.messages_for(event) {
            self.send(&message).await?;
        }

        if matches!(event, PostboxEvent::LetterDropped { .. }) {
            let client = self.client.clone();
            let release = self.layout.letter_released();
            tokio::spawn(async move {
                tokio::time::sleep(LETTER_PULSE).await;
                if let Err(e) = client
                    .publish(&release.topic, QoS::AtMostOnce, release.retain, release.payload)
                    .await
                {
                    debug!("Failed to release letter state: {}", e);
                }
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.send(&self.layout.offline()).await?;
        // Give the event loop a moment to flush before disconnecting
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect failed: {}", e);
        }
        self.eventloop.abort();
        Ok(())
    }
}
