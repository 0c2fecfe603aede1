use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

use crate::error::Error;
use crate::tasks::engine::EngineOptions;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Root directory to scan for images.
    pub photo_library_path: PathBuf,
    /// How long each image stays on screen.
    #[serde(with = "humantime_serde")]
    pub slide_duration: Duration,
    /// How many images to show; `None` shows everything found.
    pub image_count: Option<usize>,
    /// Optional deterministic seed for the shuffle.
    pub shuffle_seed: Option<u64>,
    /// Descend into subdirectories while scanning.
    pub recursive: bool,
    /// Accepted file extensions, lowercase, without the dot.
    pub extensions: Vec<String>,
    /// Resolution of the progress display.
    #[serde(with = "humantime_serde")]
    pub progress_interval: Duration,
    /// Capacity of the engine's event channel.
    pub event_buffer: usize,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            !self.slide_duration.is_zero(),
            "slide-duration must be greater than zero"
        );
        ensure!(
            self.image_count != Some(0),
            "image-count must be greater than zero"
        );
        ensure!(
            !self.progress_interval.is_zero(),
            "progress-interval must be greater than zero"
        );
        ensure!(
            self.event_buffer > 0,
            "event-buffer must be greater than zero"
        );
        self.extensions = self
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        ensure!(
            !self.extensions.is_empty(),
            "extensions must list at least one file type"
        );
        Ok(self)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            slide_duration: self.slide_duration,
            tick_period: self.progress_interval,
            event_buffer: self.event_buffer,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            photo_library_path: PathBuf::from("."),
            slide_duration: Duration::from_secs(5),
            image_count: None,
            shuffle_seed: None,
            recursive: true,
            extensions: ["jpg", "jpeg", "png", "gif"]
                .into_iter()
                .map(String::from)
                .collect(),
            progress_interval: Duration::from_secs(1),
            event_buffer: 32,
        }
    }
}
