mod debounce;
mod types;

pub use debounce::Debouncer;
pub use types::{Edge, EdgeKind, RawSample, SensorId};
