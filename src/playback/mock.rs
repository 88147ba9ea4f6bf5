use super::backend::PlaybackBackend;
use super::clips::ClipRequest;
use crate::error::PlaybackError;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A call received by [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    StartIdle(PathBuf),
    StopIdle,
    Play(ClipRequest),
    Shutdown,
}

/// Backend that records calls instead of driving a display
///
/// Clones share the same call log, so a test can keep one handle while the
/// controller owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    fail_plays: Arc<AtomicBool>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `play` calls fail as if the player could not start
    pub fn set_fail_plays(&self, fail: bool) {
        self.fail_plays.store(fail, Ordering::Relaxed);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn plays(&self) -> Vec<ClipRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Play(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: BackendCall) {
        debug!("Recording backend call: {:?}", call);
        self.calls.lock().push(call);
    }
}

impl PlaybackBackend for RecordingBackend {
    fn start_idle(&mut self, clip: &Path) -> Result<(), PlaybackError> {
        self.record(BackendCall::StartIdle(clip.to_path_buf()));
        Ok(())
    }

    fn stop_idle(&mut self) -> Result<(), PlaybackError> {
        self.record(BackendCall::StopIdle);
        Ok(())
    }

    fn play(&mut self, request: &ClipRequest) -> Result<(), PlaybackError> {
        if self.fail_plays.load(Ordering::Relaxed) {
            return Err(PlaybackError::Unavailable {
                details: format!("refusing to play {}", request.path.display()),
            });
        }
        self.record(BackendCall::Play(request.clone()));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.record(BackendCall::Shutdown);
    }
}
