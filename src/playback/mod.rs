mod backend;
mod clips;
mod controller;
mod mock;
mod schedule;

pub use backend::{MpvBackend, PlaybackBackend, PlaybackCompletion, PlaybackOutcome};
pub use clips::{ClipLibrary, ClipRequest, Trigger};
pub use controller::{PlaybackController, PlaybackState};
pub use mock::{BackendCall, RecordingBackend};
pub use schedule::ShowHours;
