use super::Publisher;
use crate::counters::{CounterFile, Counters};
use crate::error::Result;
use crate::events::{EventFilter, PostboxEvent};
use async_trait::async_trait;

/// Saves every counters snapshot through a [`CounterFile`]
pub struct CounterPersister {
    file: CounterFile,
    last_saved: Option<Counters>,
}

impl CounterPersister {
    pub fn new(file: CounterFile) -> Self {
        Self {
            file,
            last_saved: None,
        }
    }
}

#[async_trait]
impl Publisher for CounterPersister {
    fn name(&self) -> &'static str {
        "counter_file"
    }

    fn filter(&self) -> EventFilter {
        EventFilter::EventTypes(vec!["counters_updated"])
    }

    async fn publish(&mut self, event: &PostboxEvent) -> Result<()> {
        let PostboxEvent::CountersUpdated { counters, .. } = event else {
            return Ok(());
        };
        // Rollover and startup republish unchanged counters
        if self.last_saved.as_ref() == Some(counters) {
            return Ok(());
        }

        self.file.save(counters).await?;
        self.last_saved = Some(counters.clone());
        Ok(())
    }
}
