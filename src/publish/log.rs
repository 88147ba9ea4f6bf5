use super::Publisher;
use crate::error::Result;
use crate::events::PostboxEvent;
use async_trait::async_trait;
use chrono_tz::Tz;
use tracing::{debug, info};

/// Writes a line per notable event to the log
pub struct LogPublisher {
    timezone: Tz,
}

impl LogPublisher {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn publish(&mut self, event: &PostboxEvent) -> Result<()> {
        let local = event.timestamp().with_timezone(&self.timezone);
        match event {
            PostboxEvent::LetterDropped { .. } | PostboxEvent::VehiclePassed { .. } => {
                info!("[{}] {}", local.format("%Y-%m-%d %H:%M:%S%.3f"), event.description());
            }
            _ => debug!("[{}] {}", local.format("%H:%M:%S"), event.description()),
        }
        Ok(())
    }
}
