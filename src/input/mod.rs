//! Sensor sources feeding raw samples into the input queue

pub mod keyboard;
pub mod sysfs;

use crate::dispatch::Input;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use keyboard::KeyboardSource;
pub use sysfs::SysfsGpioSource;

/// Something that produces [`Input::Sample`]s
///
/// A source reports each sensor's level once when it starts and afterwards
/// only when a level changes. Levels are already corrected for polarity:
/// `true` always means the sensor is active.
#[async_trait]
pub trait SampleSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin delivering samples; returns once the source is running
    async fn start(&self, sender: mpsc::Sender<Input>) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}
