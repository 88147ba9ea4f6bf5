use crate::direction::Direction;
use crate::sensor::EdgeKind;
use chrono::NaiveTime;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound for millisecond timing options
const MAX_TIMING_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PostboxConfig {
    pub input: InputConfig,
    pub sensors: SensorsConfig,
    pub debounce: DebounceConfig,
    pub direction: DirectionConfig,
    pub letter: LetterConfig,
    pub playback: PlaybackConfig,
    pub schedule: ScheduleConfig,
    pub system: SystemConfig,
    pub mqtt: MqttConfig,
}

/// Where raw sensor samples come from
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    /// Sysfs GPIO value files
    Gpio,
    /// Keyboard keys simulate sensor pulses (debugging)
    Keyboard,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InputConfig {
    /// Sample source
    #[serde(default = "default_input_source")]
    pub source: InputSource,

    /// Root of the sysfs GPIO tree
    #[serde(default = "default_gpio_root")]
    pub gpio_root: String,

    /// GPIO polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of the serialized input queue
    #[serde(default = "default_input_queue_capacity")]
    pub input_queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    /// BCM pin number
    pub pin: u32,

    /// Invert the raw level so that `true` always means "sensor active"
    #[serde(default)]
    pub active_low: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SensorsConfig {
    #[serde(default = "default_letter_pin")]
    pub letter: PinConfig,
    #[serde(default = "default_beam_a_pin")]
    pub beam_a: PinConfig,
    #[serde(default = "default_beam_b_pin")]
    pub beam_b: PinConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DebounceConfig {
    /// A new level must hold this long before it becomes an edge
    #[serde(default = "default_debounce_window_ms")]
    pub window_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DirectionConfig {
    /// How long beam B may trail beam A (or vice versa) and still pair
    #[serde(default = "default_pairing_window_ms")]
    pub pairing_window_ms: u64,

    /// Direction reported when beam A rises before beam B
    #[serde(default = "default_a_then_b")]
    pub a_then_b: Direction,

    /// Rises within this interval after a classified vehicle open no window (0 disables)
    #[serde(default)]
    pub vehicle_cooldown_ms: u64,

    #[serde(default = "default_label_inbound")]
    pub label_inbound: String,

    #[serde(default = "default_label_outbound")]
    pub label_outbound: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LetterConfig {
    /// Which debounced edge counts as a drop
    #[serde(default = "default_trigger_edge")]
    pub trigger_edge: EdgeKind,

    /// Edges within this interval after a drop are ignored
    #[serde(default = "default_letter_cooldown_ms")]
    pub cooldown_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Player executable
    #[serde(default = "default_player")]
    pub player: String,

    /// Extra arguments passed to every player invocation
    #[serde(default = "default_player_args")]
    pub player_args: Vec<String>,

    /// Directory relative clip names are resolved against
    #[serde(default = "default_video_dir")]
    pub video_dir: String,

    /// Looping clip shown between events
    #[serde(default = "default_idle_clip")]
    pub idle_clip: String,

    #[serde(default)]
    pub letter_clips: Vec<String>,

    #[serde(default)]
    pub inbound_clips: Vec<String>,

    #[serde(default)]
    pub outbound_clips: Vec<String>,

    /// Clips running longer than this are stopped and reported as failed
    #[serde(default = "default_clip_timeout_seconds")]
    pub clip_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// When disabled the show runs around the clock
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,

    /// Show start, local HH:MM
    #[serde(default = "default_schedule_start")]
    pub start: String,

    /// Show end, local HH:MM (exclusive)
    #[serde(default = "default_schedule_end")]
    pub end: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// IANA timezone used for show hours and per-day counters
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Interval of synthetic timer ticks in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Optional JSON file counters are restored from and saved to
    #[serde(default)]
    pub counters_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Topic prefix for state and event topics
    #[serde(default = "default_mqtt_base")]
    pub base: String,

    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl PostboxConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("postbox.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let letter = default_letter_pin();
        let beam_a = default_beam_a_pin();
        let beam_b = default_beam_b_pin();

        let settings = Config::builder()
            .set_default("input.source", "gpio")?
            .set_default("input.gpio_root", default_gpio_root())?
            .set_default("input.poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default(
                "input.input_queue_capacity",
                default_input_queue_capacity() as i64,
            )?
            .set_default("sensors.letter.pin", letter.pin as i64)?
            .set_default("sensors.letter.active_low", letter.active_low)?
            .set_default("sensors.beam_a.pin", beam_a.pin as i64)?
            .set_default("sensors.beam_a.active_low", beam_a.active_low)?
            .set_default("sensors.beam_b.pin", beam_b.pin as i64)?
            .set_default("sensors.beam_b.active_low", beam_b.active_low)?
            .set_default("debounce.window_ms", default_debounce_window_ms() as i64)?
            .set_default(
                "direction.pairing_window_ms",
                default_pairing_window_ms() as i64,
            )?
            .set_default("direction.a_then_b", "inbound")?
            .set_default("direction.vehicle_cooldown_ms", 0i64)?
            .set_default("direction.label_inbound", default_label_inbound())?
            .set_default("direction.label_outbound", default_label_outbound())?
            .set_default("letter.trigger_edge", "rising")?
            .set_default("letter.cooldown_ms", default_letter_cooldown_ms() as i64)?
            .set_default("playback.player", default_player())?
            .set_default("playback.player_args", default_player_args())?
            .set_default("playback.video_dir", default_video_dir())?
            .set_default("playback.idle_clip", default_idle_clip())?
            .set_default("playback.letter_clips", Vec::<String>::new())?
            .set_default("playback.inbound_clips", Vec::<String>::new())?
            .set_default("playback.outbound_clips", Vec::<String>::new())?
            .set_default(
                "playback.clip_timeout_seconds",
                default_clip_timeout_seconds() as i64,
            )?
            .set_default("schedule.enabled", default_schedule_enabled())?
            .set_default("schedule.start", default_schedule_start())?
            .set_default("schedule.end", default_schedule_end())?
            .set_default("system.timezone", default_timezone())?
            .set_default("system.tick_interval_ms", default_tick_interval_ms() as i64)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("mqtt.enabled", false)?
            .set_default("mqtt.host", default_mqtt_host())?
            .set_default("mqtt.port", default_mqtt_port() as i64)?
            .set_default("mqtt.base", default_mqtt_base())?
            .set_default("mqtt.client_id", default_mqtt_client_id())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with POSTBOX_ prefix
            .add_source(
                Environment::with_prefix("POSTBOX")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: PostboxConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pins = [
            self.sensors.letter.pin,
            self.sensors.beam_a.pin,
            self.sensors.beam_b.pin,
        ];
        if pins[0] == pins[1] || pins[0] == pins[2] || pins[1] == pins[2] {
            return Err(ConfigError::Message(
                "Letter, beam A and beam B must use distinct pins".to_string(),
            ));
        }

        if self.input.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Input poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.input.input_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Input queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.direction.pairing_window_ms == 0 {
            return Err(ConfigError::Message(
                "Direction pairing_window_ms must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("debounce.window_ms", self.debounce.window_ms),
            ("direction.pairing_window_ms", self.direction.pairing_window_ms),
            ("direction.vehicle_cooldown_ms", self.direction.vehicle_cooldown_ms),
            ("letter.cooldown_ms", self.letter.cooldown_ms),
        ] {
            if value > MAX_TIMING_MS {
                return Err(ConfigError::Message(format!(
                    "{} must be at most {} (one day)",
                    name, MAX_TIMING_MS
                )));
            }
        }

        if self.direction.a_then_b == Direction::Unknown {
            return Err(ConfigError::Message(
                "Direction a_then_b must be 'inbound' or 'outbound'".to_string(),
            ));
        }

        if self.playback.clip_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Playback clip_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.schedule.enabled {
            parse_clock(&self.schedule.start)?;
            parse_clock(&self.schedule.end)?;
        }

        if self.system.timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::Message(format!(
                "Unknown timezone '{}'",
                self.system.timezone
            )));
        }

        if self.system.tick_interval_ms == 0 {
            return Err(ConfigError::Message(
                "System tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.mqtt.enabled && self.mqtt.host.is_empty() {
            return Err(ConfigError::Message(
                "MQTT host must be set when MQTT is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the configured timezone, falling back to UTC on parse errors
    pub fn timezone(&self) -> Tz {
        match self.system.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(
                    "Invalid timezone '{}', falling back to UTC",
                    self.system.timezone
                );
                chrono_tz::UTC
            }
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.system.tick_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.input.poll_interval_ms)
    }

    pub fn counters_path(&self) -> Option<PathBuf> {
        self.system.counters_path.as_ref().map(PathBuf::from)
    }
}

/// Parse an `HH:MM` wall-clock time
pub fn parse_clock(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| ConfigError::Message(format!("Invalid time '{}': {}", value, e)))
}

impl Default for PostboxConfig {
    fn default() -> Self {
        Self {
            input: InputConfig {
                source: default_input_source(),
                gpio_root: default_gpio_root(),
                poll_interval_ms: default_poll_interval_ms(),
                input_queue_capacity: default_input_queue_capacity(),
            },
            sensors: SensorsConfig {
                letter: default_letter_pin(),
                beam_a: default_beam_a_pin(),
                beam_b: default_beam_b_pin(),
            },
            debounce: DebounceConfig {
                window_ms: default_debounce_window_ms(),
            },
            direction: DirectionConfig {
                pairing_window_ms: default_pairing_window_ms(),
                a_then_b: default_a_then_b(),
                vehicle_cooldown_ms: 0,
                label_inbound: default_label_inbound(),
                label_outbound: default_label_outbound(),
            },
            letter: LetterConfig {
                trigger_edge: default_trigger_edge(),
                cooldown_ms: default_letter_cooldown_ms(),
            },
            playback: PlaybackConfig {
                player: default_player(),
                player_args: default_player_args(),
                video_dir: default_video_dir(),
                idle_clip: default_idle_clip(),
                letter_clips: Vec::new(),
                inbound_clips: Vec::new(),
                outbound_clips: Vec::new(),
                clip_timeout_seconds: default_clip_timeout_seconds(),
            },
            schedule: ScheduleConfig {
                enabled: default_schedule_enabled(),
                start: default_schedule_start(),
                end: default_schedule_end(),
            },
            system: SystemConfig {
                timezone: default_timezone(),
                tick_interval_ms: default_tick_interval_ms(),
                event_bus_capacity: default_event_bus_capacity(),
                counters_path: None,
            },
            mqtt: MqttConfig {
                enabled: false,
                host: default_mqtt_host(),
                port: default_mqtt_port(),
                base: default_mqtt_base(),
                client_id: default_mqtt_client_id(),
                username: None,
                password: None,
            },
        }
    }
}

// Default value functions
fn default_input_source() -> InputSource {
    InputSource::Gpio
}
fn default_gpio_root() -> String {
    "/sys/class/gpio".to_string()
}
fn default_poll_interval_ms() -> u64 {
    5
}
fn default_input_queue_capacity() -> usize {
    1024
}

fn default_letter_pin() -> PinConfig {
    // Break-beam across the slot pulls the line low when interrupted
    PinConfig {
        pin: 17,
        active_low: true,
    }
}
fn default_beam_a_pin() -> PinConfig {
    PinConfig {
        pin: 22,
        active_low: false,
    }
}
fn default_beam_b_pin() -> PinConfig {
    PinConfig {
        pin: 27,
        active_low: false,
    }
}

fn default_debounce_window_ms() -> u64 {
    30
}

fn default_pairing_window_ms() -> u64 {
    2000
}
fn default_a_then_b() -> Direction {
    Direction::Inbound
}
fn default_label_inbound() -> String {
    "Inbound".to_string()
}
fn default_label_outbound() -> String {
    "Outbound".to_string()
}

fn default_trigger_edge() -> EdgeKind {
    EdgeKind::Rising
}
fn default_letter_cooldown_ms() -> u64 {
    3000
}

fn default_player() -> String {
    "mpv".to_string()
}
fn default_player_args() -> Vec<String> {
    vec![
        "--fs".to_string(),
        "--no-osd-bar".to_string(),
        "--really-quiet".to_string(),
    ]
}
fn default_video_dir() -> String {
    "./videos".to_string()
}
fn default_idle_clip() -> String {
    "idle.mp4".to_string()
}
fn default_clip_timeout_seconds() -> u64 {
    65
}

fn default_schedule_enabled() -> bool {
    true
}
fn default_schedule_start() -> String {
    "16:00".to_string()
}
fn default_schedule_end() -> String {
    "22:00".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_tick_interval_ms() -> u64 {
    20
}
fn default_event_bus_capacity() -> usize {
    100
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_mqtt_base() -> String {
    "santa_mailbox".to_string()
}
fn default_mqtt_client_id() -> String {
    "postbox".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PostboxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.direction.a_then_b, Direction::Inbound);
        assert_eq!(config.letter.trigger_edge, EdgeKind::Rising);
        assert_eq!(config.timezone(), chrono_tz::UTC);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[direction]
pairing_window_ms = 1500
a_then_b = "outbound"

[letter]
trigger_edge = "falling"
cooldown_ms = 5000

[playback]
letter_clips = ["letters/one.mp4", "letters/two.mp4"]

[system]
timezone = "America/New_York"
"#
        )
        .unwrap();

        let config = PostboxConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.direction.pairing_window_ms, 1500);
        assert_eq!(config.direction.a_then_b, Direction::Outbound);
        assert_eq!(config.letter.trigger_edge, EdgeKind::Falling);
        assert_eq!(config.letter.cooldown_ms, 5000);
        assert_eq!(config.playback.letter_clips.len(), 2);
        assert_eq!(config.timezone(), chrono_tz::America::New_York);

        // Untouched sections keep their defaults
        assert_eq!(config.debounce.window_ms, 30);
        assert_eq!(config.sensors.letter.pin, 17);
        assert!(config.sensors.letter.active_low);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = PostboxConfig::load_from_file("/nonexistent/postbox-test").unwrap();
        assert_eq!(config, PostboxConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PostboxConfig::default();

        config.direction.a_then_b = Direction::Unknown;
        assert!(config.validate().is_err());
        config.direction.a_then_b = Direction::Outbound;
        assert!(config.validate().is_ok());

        config.sensors.beam_b.pin = config.sensors.beam_a.pin;
        assert!(config.validate().is_err());
        config.sensors.beam_b.pin = 27;

        config.schedule.start = "25:00".to_string();
        assert!(config.validate().is_err());
        config.schedule.enabled = false;
        assert!(config.validate().is_ok());

        config.debounce.window_ms = u64::MAX;
        assert!(config.validate().is_err());
        config.debounce.window_ms = 30;

        config.direction.pairing_window_ms = MAX_TIMING_MS + 1;
        assert!(config.validate().is_err());
        config.direction.pairing_window_ms = MAX_TIMING_MS;
        assert!(config.validate().is_ok());
        config.direction.pairing_window_ms = 2000;

        config.direction.vehicle_cooldown_ms = u64::MAX;
        assert!(config.validate().is_err());
        config.direction.vehicle_cooldown_ms = 0;

        config.letter.cooldown_ms = 1 << 63;
        assert!(config.validate().is_err());
        config.letter.cooldown_ms = 3000;
        assert!(config.validate().is_ok());

        config.system.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().is_err());
        assert_eq!(config.timezone(), chrono_tz::UTC);
    }

    #[test]
    fn test_default_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&PostboxConfig::default()).unwrap();
        assert!(rendered.contains("[direction]"));
        assert!(rendered.contains("pairing_window_ms = 2000"));
    }
}
