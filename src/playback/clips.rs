use crate::config::PlaybackConfig;
use crate::direction::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// What asked for a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "direction", rename_all = "lowercase")]
pub enum Trigger {
    Letter,
    Vehicle(Direction),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Letter => f.write_str("letter"),
            Trigger::Vehicle(direction) => write!(f, "vehicle {}", direction),
        }
    }
}

/// A single clip play handed to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRequest {
    pub play_id: u64,
    pub trigger: Trigger,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
struct Rotation {
    clips: Vec<String>,
    next: usize,
}

impl Rotation {
    fn new(clips: Vec<String>) -> Self {
        Self { clips, next: 0 }
    }

    fn advance(&mut self) -> Option<&str> {
        if self.clips.is_empty() {
            return None;
        }
        let index = self.next % self.clips.len();
        self.next = self.next.wrapping_add(1);
        Some(&self.clips[index])
    }
}

/// Clip names per trigger kind, rotated round-robin
#[derive(Debug, Clone)]
pub struct ClipLibrary {
    video_dir: PathBuf,
    idle: String,
    letter: Rotation,
    inbound: Rotation,
    outbound: Rotation,
}

impl ClipLibrary {
    pub fn new<P: Into<PathBuf>>(video_dir: P, idle: impl Into<String>) -> Self {
        Self {
            video_dir: video_dir.into(),
            idle: idle.into(),
            letter: Rotation::default(),
            inbound: Rotation::default(),
            outbound: Rotation::default(),
        }
    }

    pub fn with_letter_clips(mut self, clips: Vec<String>) -> Self {
        self.letter = Rotation::new(clips);
        self
    }

    pub fn with_vehicle_clips(mut self, inbound: Vec<String>, outbound: Vec<String>) -> Self {
        self.inbound = Rotation::new(inbound);
        self.outbound = Rotation::new(outbound);
        self
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(&config.video_dir, config.idle_clip.clone())
            .with_letter_clips(config.letter_clips.clone())
            .with_vehicle_clips(config.inbound_clips.clone(), config.outbound_clips.clone())
    }

    pub fn idle_path(&self) -> PathBuf {
        self.resolve(&self.idle)
    }

    pub fn has_clip_for(&self, trigger: Trigger) -> bool {
        self.rotation(trigger)
            .map(|rotation| !rotation.clips.is_empty())
            .unwrap_or(false)
    }

    /// Next clip for a trigger, advancing its rotation
    pub fn next_for(&mut self, trigger: Trigger) -> Option<PathBuf> {
        let name = match trigger {
            Trigger::Letter => self.letter.advance(),
            Trigger::Vehicle(Direction::Inbound) => self.inbound.advance(),
            Trigger::Vehicle(Direction::Outbound) => self.outbound.advance(),
            Trigger::Vehicle(Direction::Unknown) => None,
        }?
        .to_string();
        Some(self.resolve(&name))
    }

    fn rotation(&self, trigger: Trigger) -> Option<&Rotation> {
        match trigger {
            Trigger::Letter => Some(&self.letter),
            Trigger::Vehicle(Direction::Inbound) => Some(&self.inbound),
            Trigger::Vehicle(Direction::Outbound) => Some(&self.outbound),
            Trigger::Vehicle(Direction::Unknown) => None,
        }
    }

    /// Absolute names are kept, relative ones join the video directory
    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.video_dir.join(path)
        }
    }
}
