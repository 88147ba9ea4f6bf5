use super::SampleSource;
use crate::dispatch::Input;
use crate::error::Result;
use crate::events::{EventBus, PostboxEvent};
use crate::sensor::{RawSample, SensorId};
use async_trait::async_trait;
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a simulated sensor stays active; longer than any sane debounce window
const PULSE: Duration = Duration::from_millis(150);

/// Sensor a key simulates, if any
pub fn sensor_for_key(code: KeyCode) -> Option<SensorId> {
    match code {
        KeyCode::Char('l') | KeyCode::Char(' ') => Some(SensorId::Letter),
        KeyCode::Char('a') => Some(SensorId::BeamA),
        KeyCode::Char('b') => Some(SensorId::BeamB),
        _ => None,
    }
}

/// Keyboard stand-in for the sensors, for bench testing without hardware
///
/// `l` (or space) pulses the letter sensor, `a` and `b` pulse the beams,
/// `q` or Esc requests shutdown.
pub struct KeyboardSource {
    event_bus: EventBus,
    cancellation_token: CancellationToken,
}

impl KeyboardSource {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }
}

fn pulse(sender: &mpsc::Sender<Input>, sensor: SensorId) -> bool {
    let press = RawSample::new(sensor, true, Utc::now());
    if sender.blocking_send(Input::Sample(press)).is_err() {
        return false;
    }
    std::thread::sleep(PULSE);
    let release = RawSample::new(sensor, false, Utc::now());
    sender.blocking_send(Input::Sample(release)).is_ok()
}

#[async_trait]
impl SampleSource for KeyboardSource {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    async fn start(&self, sender: mpsc::Sender<Input>) -> Result<()> {
        info!("Starting keyboard source - l: letter, a/b: beams, q: quit");

        let event_bus = self.event_bus.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            let now = Utc::now();
            for sensor in SensorId::ALL {
                if sender
                    .blocking_send(Input::Sample(RawSample::new(sensor, false, now)))
                    .is_err()
                {
                    return;
                }
            }

            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }
            debug!("Raw mode enabled - keyboard source active");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match key_event.code {
                            KeyCode::Char('q') | KeyCode::Esc => {
                                info!("Quit key pressed - requesting shutdown");
                                if let Err(e) =
                                    event_bus.publish(PostboxEvent::ShutdownRequested {
                                        timestamp: Utc::now(),
                                        reason: "User requested via keyboard".to_string(),
                                    })
                                {
                                    warn!("Failed to publish shutdown event: {}", e);
                                }
                                break;
                            }
                            code => match sensor_for_key(code) {
                                Some(sensor) => {
                                    info!("Key {:?} - pulsing {}", code, sensor);
                                    if !pulse(&sender, sensor) {
                                        debug!("Input queue closed");
                                        break;
                                    }
                                }
                                None => debug!("Key pressed: {:?}", code),
                            },
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Error polling for keyboard events: {}", e),
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard source exited");
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard source");
        self.cancellation_token.cancel();

        // Give the blocking task a moment to restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(sensor_for_key(KeyCode::Char('l')), Some(SensorId::Letter));
        assert_eq!(sensor_for_key(KeyCode::Char(' ')), Some(SensorId::Letter));
        assert_eq!(sensor_for_key(KeyCode::Char('a')), Some(SensorId::BeamA));
        assert_eq!(sensor_for_key(KeyCode::Char('b')), Some(SensorId::BeamB));
        assert_eq!(sensor_for_key(KeyCode::Char('q')), None);
        assert_eq!(sensor_for_key(KeyCode::Enter), None);
    }

    #[tokio::test]
    async fn test_pulse_sends_press_and_release() {
        let (tx, mut rx) = mpsc::channel(4);

        let sent = task::spawn_blocking(move || pulse(&tx, SensorId::BeamA))
            .await
            .unwrap();
        assert!(sent);

        let mut levels = Vec::new();
        while let Ok(Input::Sample(sample)) = rx.try_recv() {
            assert_eq!(sample.sensor, SensorId::BeamA);
            levels.push(sample.level);
        }
        assert_eq!(levels, vec![true, false]);
    }

    #[tokio::test]
    async fn test_keyboard_source_stop() {
        let source = KeyboardSource::new(EventBus::new(10));

        source.stop().await.unwrap();
        assert!(source.cancellation_token.is_cancelled());
    }
}
