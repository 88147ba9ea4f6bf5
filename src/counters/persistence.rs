use super::store::Counters;
use crate::error::{PostboxError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// JSON file holding the last saved [`Counters`]
#[derive(Debug, Clone)]
pub struct CounterFile {
    path: PathBuf,
}

impl CounterFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved counters; a missing file yields empty counters
    pub async fn load(&self) -> Result<Counters> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No counter file at {}, starting from zero",
                    self.path.display()
                );
                return Ok(Counters::default());
            }
            Err(e) => return Err(e.into()),
        };

        let counters: Counters = serde_json::from_str(&content)?;
        info!(
            "Loaded counters from {}: {} cars, {} letters",
            self.path.display(),
            counters.car_total(),
            counters.total_letters
        );
        Ok(counters)
    }

    /// Write via a temporary file and rename, so readers never see a partial file
    pub async fn save(&self, counters: &Counters) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(counters)?;
        let tmp = self.temp_path();
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            PostboxError::system(format!(
                "Failed to replace counter file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Saved counters to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "counters".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
