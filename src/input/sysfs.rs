use super::SampleSource;
use crate::config::{PinConfig, PostboxConfig};
use crate::dispatch::Input;
use crate::error::{GpioError, Result};
use crate::sensor::{RawSample, SensorId};
use async_trait::async_trait;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct WatchedPin {
    sensor: SensorId,
    config: PinConfig,
    value_path: PathBuf,
}

/// Polls the kernel's sysfs GPIO value files on a blocking thread
pub struct SysfsGpioSource {
    root: PathBuf,
    pins: Vec<WatchedPin>,
    poll_interval: Duration,
    cancellation_token: CancellationToken,
}

impl SysfsGpioSource {
    pub fn new<P: Into<PathBuf>>(
        root: P,
        pins: Vec<(SensorId, PinConfig)>,
        poll_interval: Duration,
    ) -> Self {
        let root = root.into();
        let pins = pins
            .into_iter()
            .map(|(sensor, config)| WatchedPin {
                sensor,
                config,
                value_path: root.join(format!("gpio{}", config.pin)).join("value"),
            })
            .collect();
        Self {
            root,
            pins,
            poll_interval,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &PostboxConfig) -> Self {
        Self::new(
            &config.input.gpio_root,
            vec![
                (SensorId::Letter, config.sensors.letter),
                (SensorId::BeamA, config.sensors.beam_a),
                (SensorId::BeamB, config.sensors.beam_b),
            ],
            config.poll_interval(),
        )
    }

    /// Export a pin as an input unless the kernel already exposes it
    fn export(&self, pin: u32) -> std::result::Result<(), GpioError> {
        let pin_dir = self.root.join(format!("gpio{}", pin));
        if pin_dir.exists() {
            return Ok(());
        }

        fs::write(self.root.join("export"), pin.to_string())
            .map_err(|source| GpioError::Export { pin, source })?;
        fs::write(pin_dir.join("direction"), "in")
            .map_err(|source| GpioError::Export { pin, source })?;
        debug!("Exported GPIO {} as input", pin);
        Ok(())
    }
}

/// Parse a sysfs value file's contents into a raw electrical level
pub fn parse_level(pin: u32, value: &str) -> std::result::Result<bool, GpioError> {
    match value.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(GpioError::InvalidLevel {
            pin,
            value: other.to_string(),
        }),
    }
}

fn read_active(pin: &WatchedPin) -> std::result::Result<bool, GpioError> {
    let raw = fs::read_to_string(&pin.value_path).map_err(|source| GpioError::Read {
        pin: pin.config.pin,
        source,
    })?;
    Ok(parse_level(pin.config.pin, &raw)? != pin.config.active_low)
}

fn poll_pins(
    pins: &[WatchedPin],
    poll_interval: Duration,
    sender: &mpsc::Sender<Input>,
    cancellation_token: &CancellationToken,
) -> std::result::Result<(), GpioError> {
    let mut levels: Vec<Option<bool>> = vec![None; pins.len()];
    let mut failing = vec![false; pins.len()];

    while !cancellation_token.is_cancelled() {
        for (index, pin) in pins.iter().enumerate() {
            let level = match read_active(pin) {
                Ok(level) => {
                    if failing[index] {
                        info!("GPIO {} readable again", pin.config.pin);
                        failing[index] = false;
                    }
                    level
                }
                Err(e) => {
                    if !failing[index] {
                        warn!("{}", e);
                        failing[index] = true;
                    }
                    continue;
                }
            };

            if levels[index] == Some(level) {
                continue;
            }
            levels[index] = Some(level);

            let sample = RawSample::new(pin.sensor, level, Utc::now());
            sender
                .blocking_send(Input::Sample(sample))
                .map_err(|_| GpioError::QueueClosed)?;
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

#[async_trait]
impl SampleSource for SysfsGpioSource {
    fn name(&self) -> &'static str {
        "gpio"
    }

    async fn start(&self, sender: mpsc::Sender<Input>) -> Result<()> {
        for pin in &self.pins {
            if let Err(e) = self.export(pin.config.pin) {
                warn!("{} (continuing, pin may be configured externally)", e);
            }
            info!(
                "Watching {} on GPIO {}{}",
                pin.sensor,
                pin.config.pin,
                if pin.config.active_low { " (active low)" } else { "" }
            );
        }

        let pins = self.pins.clone();
        let poll_interval = self.poll_interval;
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            match poll_pins(&pins, poll_interval, &sender, &cancellation_token) {
                Ok(()) => debug!("GPIO polling stopped"),
                Err(GpioError::QueueClosed) => debug!("Input queue closed, GPIO polling stopped"),
                Err(e) => error!("GPIO polling failed: {}", e),
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("Stopping GPIO source");
        self.cancellation_token.cancel();
        Ok(())
    }
}

impl std::fmt::Debug for SysfsGpioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysfsGpioSource")
            .field("root", &self.root)
            .field("pins", &self.pins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;
    use tokio::time::timeout;

    fn value_path(root: &Path, pin: u32) -> PathBuf {
        root.join(format!("gpio{}", pin)).join("value")
    }

    fn fake_pin(root: &Path, pin: u32, value: &str) {
        let dir = root.join(format!("gpio{}", pin));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("value"), value).unwrap();
    }

    fn pin(pin: u32, active_low: bool) -> PinConfig {
        PinConfig { pin, active_low }
    }

    async fn next_sample(rx: &mut mpsc::Receiver<Input>) -> RawSample {
        match timeout(Duration::from_secs(2), rx.recv()).await.unwrap() {
            Some(Input::Sample(sample)) => sample,
            other => panic!("Unexpected input: {:?}", other),
        }
    }

    #[test]
    fn test_parse_level() {
        assert!(parse_level(4, "1\n").unwrap());
        assert!(!parse_level(4, "0").unwrap());
        assert!(matches!(
            parse_level(4, "x"),
            Err(GpioError::InvalidLevel { pin: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_reports_baseline_then_changes() {
        let dir = tempdir().unwrap();
        fake_pin(dir.path(), 17, "1\n");
        fake_pin(dir.path(), 22, "0\n");

        let source = SysfsGpioSource::new(
            dir.path(),
            vec![(SensorId::Letter, pin(17, true)), (SensorId::BeamA, pin(22, false))],
            Duration::from_millis(5),
        );
        let (tx, mut rx) = mpsc::channel(16);
        source.start(tx).await.unwrap();

        let letter = next_sample(&mut rx).await;
        assert_eq!(letter.sensor, SensorId::Letter);
        // Active low: a high pin means the sensor is idle
        assert!(!letter.level);
        let beam = next_sample(&mut rx).await;
        assert_eq!(beam.sensor, SensorId::BeamA);
        assert!(!beam.level);

        fs::write(value_path(dir.path(), 22), "1\n").unwrap();
        let changed = next_sample(&mut rx).await;
        assert_eq!(changed.sensor, SensorId::BeamA);
        assert!(changed.level);

        source.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_pin_does_not_stop_others() {
        let dir = tempdir().unwrap();
        fake_pin(dir.path(), 27, "1");
        // gpio5 has a directory but no value file
        fs::create_dir_all(dir.path().join("gpio5")).unwrap();

        let source = SysfsGpioSource::new(
            dir.path(),
            vec![(SensorId::Letter, pin(5, false)), (SensorId::BeamB, pin(27, false))],
            Duration::from_millis(5),
        );
        let (tx, mut rx) = mpsc::channel(16);
        source.start(tx).await.unwrap();

        let sample = next_sample(&mut rx).await;
        assert_eq!(sample.sensor, SensorId::BeamB);
        assert!(sample.level);

        source.stop().await.unwrap();
    }
}
