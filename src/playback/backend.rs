use super::clips::ClipRequest;
use crate::config::PlaybackConfig;
use crate::dispatch::Input;
use crate::error::PlaybackError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a clip play ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackOutcome {
    Completed,
    Failed { reason: String },
    TimedOut,
}

/// Completion notice fed back into the input queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackCompletion {
    pub play_id: u64,
    pub outcome: PlaybackOutcome,
}

/// Video output the playback controller drives
///
/// Every call is fire-and-forget: `play` returns once the clip has been
/// started, and the end of the clip arrives later as a
/// [`PlaybackCompletion`] through the input queue.
pub trait PlaybackBackend: Send {
    /// Start the looping idle clip if it is not already running
    fn start_idle(&mut self, clip: &Path) -> Result<(), PlaybackError>;

    /// Stop the idle loop if it is running
    fn stop_idle(&mut self) -> Result<(), PlaybackError>;

    /// Start a one-shot clip
    fn play(&mut self, request: &ClipRequest) -> Result<(), PlaybackError>;

    /// Stop everything, dropping any completion still in flight
    fn shutdown(&mut self) {
        if let Err(e) = self.stop_idle() {
            warn!("Failed to stop idle loop during shutdown: {}", e);
        }
    }
}

const IDLE_ARGS: &[&str] = &["--loop=inf"];
const CLIP_ARGS: &[&str] = &["--ontop"];

/// Runs clips through an external player process (mpv by default)
pub struct MpvBackend {
    player: String,
    args: Vec<String>,
    clip_timeout: Duration,
    completions: mpsc::Sender<Input>,
    idle: Option<Child>,
    cancellation_token: CancellationToken,
}

impl MpvBackend {
    pub fn new(
        player: impl Into<String>,
        args: Vec<String>,
        clip_timeout: Duration,
        completions: mpsc::Sender<Input>,
    ) -> Self {
        Self {
            player: player.into(),
            args,
            clip_timeout,
            completions,
            idle: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &PlaybackConfig, completions: mpsc::Sender<Input>) -> Self {
        Self::new(
            config.player.clone(),
            config.player_args.clone(),
            Duration::from_secs(config.clip_timeout_seconds),
            completions,
        )
    }

    fn command(&self, extra: &[&str], clip: &Path) -> Command {
        let mut command = Command::new(&self.player);
        command
            .args(&self.args)
            .args(extra)
            .arg(clip)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }

    fn idle_running(&mut self) -> bool {
        match self.idle.as_mut().map(|child| child.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                warn!("Idle loop exited unexpectedly with {}", status);
                self.idle = None;
                false
            }
            Some(Err(e)) => {
                warn!("Failed to query idle loop: {}", e);
                self.idle = None;
                false
            }
            None => false,
        }
    }
}

impl PlaybackBackend for MpvBackend {
    fn start_idle(&mut self, clip: &Path) -> Result<(), PlaybackError> {
        if self.idle_running() {
            return Ok(());
        }

        let child = self
            .command(IDLE_ARGS, clip)
            .spawn()
            .map_err(|e| PlaybackError::Spawn {
                clip: clip.display().to_string(),
                source: e,
            })?;
        info!("Idle loop started: {}", clip.display());
        self.idle = Some(child);
        Ok(())
    }

    fn stop_idle(&mut self) -> Result<(), PlaybackError> {
        let Some(mut child) = self.idle.take() else {
            return Ok(());
        };

        child.start_kill().map_err(|e| PlaybackError::Stop {
            details: e.to_string(),
        })?;
        // Reap in the background so the dispatcher never waits on the player
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
        debug!("Idle loop stopped");
        Ok(())
    }

    fn play(&mut self, request: &ClipRequest) -> Result<(), PlaybackError> {
        let mut child = self
            .command(CLIP_ARGS, &request.path)
            .spawn()
            .map_err(|e| PlaybackError::Spawn {
                clip: request.path.display().to_string(),
                source: e,
            })?;

        info!(
            "Playing clip {} for {} (play {})",
            request.path.display(),
            request.trigger,
            request.play_id
        );

        let play_id = request.play_id;
        let clip_timeout = self.clip_timeout;
        let completions = self.completions.clone();
        let cancellation_token = self.cancellation_token.child_token();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancellation_token.cancelled() => {
                    let _ = child.start_kill();
                    debug!("Clip {} cancelled", play_id);
                    return;
                }
                result = tokio::time::timeout(clip_timeout, child.wait()) => match result {
                    Ok(Ok(status)) if status.success() => PlaybackOutcome::Completed,
                    Ok(Ok(status)) => PlaybackOutcome::Failed {
                        reason: format!("player exited with {}", status),
                    },
                    Ok(Err(e)) => PlaybackOutcome::Failed {
                        reason: e.to_string(),
                    },
                    Err(_) => {
                        warn!("Clip {} exceeded {:?}, stopping player", play_id, clip_timeout);
                        let _ = child.start_kill();
                        PlaybackOutcome::TimedOut
                    }
                },
            };

            let completion = PlaybackCompletion { play_id, outcome };
            if completions
                .send(Input::PlaybackFinished(completion))
                .await
                .is_err()
            {
                error!("Input queue closed before clip {} completion", play_id);
            }
        });

        Ok(())
    }

    fn shutdown(&mut self) {
        self.cancellation_token.cancel();
        if let Err(e) = self.stop_idle() {
            warn!("Failed to stop idle loop during shutdown: {}", e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use super::super::clips::Trigger;
    use std::path::PathBuf;
    use tokio::time::timeout;

    fn request(play_id: u64) -> ClipRequest {
        ClipRequest {
            play_id,
            trigger: Trigger::Letter,
            path: PathBuf::from("/tmp/postbox-test-clip.mp4"),
        }
    }

    #[tokio::test]
    async fn test_missing_player_fails_to_spawn() {
        let (tx, _rx) = mpsc::channel(4);
        let mut backend = MpvBackend::new(
            "/nonexistent/postbox-player",
            Vec::new(),
            Duration::from_secs(1),
            tx,
        );

        let result = backend.play(&request(0));
        assert!(matches!(result, Err(PlaybackError::Spawn { .. })));
        assert!(backend
            .start_idle(Path::new("/tmp/postbox-idle.mp4"))
            .is_err());
    }

    #[tokio::test]
    async fn test_finished_clip_reports_completion() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut backend = MpvBackend::new("true", Vec::new(), Duration::from_secs(5), tx);

        backend.play(&request(7)).unwrap();

        let input = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match input {
            Input::PlaybackFinished(completion) => {
                assert_eq!(completion.play_id, 7);
                assert_eq!(completion.outcome, PlaybackOutcome::Completed);
            }
            other => panic!("Unexpected input: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overlong_clip_times_out() {
        let (tx, mut rx) = mpsc::channel(4);
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let mut backend = MpvBackend::new("sh", args, Duration::from_millis(200), tx);

        backend.play(&request(3)).unwrap();

        let input = timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match input {
            Input::PlaybackFinished(completion) => {
                assert_eq!(completion.play_id, 3);
                assert_eq!(completion.outcome, PlaybackOutcome::TimedOut);
            }
            other => panic!("Unexpected input: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_clip() {
        let (tx, mut rx) = mpsc::channel(4);
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let mut backend = MpvBackend::new("sh", args, Duration::from_secs(10), tx);

        backend.play(&request(1)).unwrap();
        backend.shutdown();

        // The cancelled task drops its sender clone without reporting
        drop(backend);
        let next = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(next.is_none());
    }
}
