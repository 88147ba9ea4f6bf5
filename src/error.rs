use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostboxError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl PostboxError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the GPIO input sources
#[derive(Error, Debug)]
pub enum GpioError {
    #[error("Failed to export GPIO pin {pin}: {source}")]
    Export {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read GPIO pin {pin}: {source}")]
    Read {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected value {value:?} on GPIO pin {pin}")]
    InvalidLevel { pin: u32, value: String },

    #[error("Input queue closed")]
    QueueClosed,
}

/// Errors raised by a playback backend
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Failed to spawn player for {clip}: {source}")]
    Spawn {
        clip: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop idle loop: {details}")]
    Stop { details: String },

    #[error("Backend unavailable: {details}")]
    Unavailable { details: String },
}

/// Errors raised by the event bus
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, PostboxError>;
