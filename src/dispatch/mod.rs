//! The single serialized processing path
//!
//! Every sample, timer tick and playback completion travels through one
//! bounded queue of [`Input`]s consumed by the [`Dispatcher`], which owns
//! all state machines outright.

pub mod dispatcher;
pub mod ticker;


use crate::playback::PlaybackCompletion;
use crate::sensor::RawSample;
use chrono::{DateTime, Utc};

pub use dispatcher::Dispatcher;
pub use ticker::spawn_ticker;

/// Items on the input queue
#[derive(Debug, Clone)]
pub enum Input {
    /// A raw reading from a sensor source
    Sample(RawSample),
    /// Wall-clock tick driving debounce confirmation, window expiry,
    /// show hours and day rollover
    Tick(DateTime<Utc>),
    /// The playback backend finished (or gave up on) a clip
    PlaybackFinished(PlaybackCompletion),
    /// Stop processing, discarding anything in flight
    Shutdown { reason: String },
}

impl Input {
    pub fn kind(&self) -> &'static str {
        match self {
            Input::Sample(_) => "sample",
            Input::Tick(_) => "tick",
            Input::PlaybackFinished(_) => "playback_finished",
            Input::Shutdown { .. } => "shutdown",
        }
    }
}
