use crate::config::{parse_clock, ScheduleConfig};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use config::ConfigError;

/// Daily window during which the idle loop runs and triggers play clips
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowHours {
    window: Option<(NaiveTime, NaiveTime)>,
    timezone: Tz,
}

impl ShowHours {
    /// Show runs around the clock
    pub fn always(timezone: Tz) -> Self {
        Self {
            window: None,
            timezone,
        }
    }

    /// `start` inclusive, `end` exclusive; `start > end` wraps past midnight
    pub fn between(start: NaiveTime, end: NaiveTime, timezone: Tz) -> Self {
        if start == end {
            return Self::always(timezone);
        }
        Self {
            window: Some((start, end)),
            timezone,
        }
    }

    pub fn from_config(config: &ScheduleConfig, timezone: Tz) -> Result<Self, ConfigError> {
        if !config.enabled {
            return Ok(Self::always(timezone));
        }
        Ok(Self::between(
            parse_clock(&config.start)?,
            parse_clock(&config.end)?,
            timezone,
        ))
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let Some((start, end)) = self.window else {
            return true;
        };
        let local = now.with_timezone(&self.timezone).time();
        if start < end {
            start <= local && local < end
        } else {
            local >= start || local < end
        }
    }
}
