pub mod app;
pub mod config;
pub mod counters;
pub mod direction;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod input;
pub mod letter;
pub mod playback;
pub mod publish;
pub mod sensor;

pub use app::{ComponentState, PostboxOrchestrator, ShutdownReason};
pub use config::PostboxConfig;
pub use counters::{CounterFile, CounterStore, Counters, DayCounts};
pub use direction::{Direction, DirectionResolver, VehicleEvent};
pub use dispatch::{Dispatcher, Input};
pub use error::{PostboxError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, PostboxEvent};
pub use letter::{LetterDetector, LetterEvent};
pub use playback::{PlaybackBackend, PlaybackController, PlaybackState, ShowHours, Trigger};
pub use sensor::{Debouncer, Edge, EdgeKind, RawSample, SensorId};
