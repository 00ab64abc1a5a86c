//! Library configuration.
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file,
//! then `SNIPS__*` environment variables (`SNIPS__PREVIEW__WORKERS=2`).

use crate::error::{Result, SnipError};
use crate::logging::LoggingConfig;
use crate::preview::processor::PreviewSize;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directory holding one sub-directory per user
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_user")]
    pub user: String,

    /// Snip file extension, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default)]
    pub preview: PreviewConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Blocking decode threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_max_width")]
    pub max_width: u32,

    #[serde(default = "default_max_height")]
    pub max_height: u32,

    /// Whole-cache flush period
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Playback rate of generated GIFs
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

fn default_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snips")
}

fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| "default".to_string())
}

fn default_extension() -> String {
    "uti".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_max_width() -> u32 {
    400
}

fn default_max_height() -> u32 {
    300
}

fn default_flush_interval_secs() -> u64 {
    300
}

fn default_frame_rate() -> u32 {
    24
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            flush_interval_secs: default_flush_interval_secs(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl PreviewConfig {
    pub fn max_size(&self) -> PreviewSize {
        PreviewSize {
            width: self.max_width,
            height: self.max_height,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            user: default_user(),
            extension: default_extension(),
            preview: PreviewConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LibraryConfig {
    /// Library rooted at `root` for `user`, everything else default
    pub fn for_user(root: impl Into<PathBuf>, user: &str) -> Self {
        Self {
            root: root.into(),
            user: user.to_string(),
            ..Self::default()
        }
    }

    /// Merge defaults, the optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&LibraryConfig::default())?);

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("SNIPS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<LibraryConfig>()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(SnipError::Config("user must not be empty".to_string()));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(SnipError::Config("extension must not be empty".to_string()));
        }
        if self.preview.workers == 0 {
            return Err(SnipError::Config("preview.workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Root of the configured user's library
    pub fn user_root(&self) -> PathBuf {
        self.root.join(&self.user)
    }
}

/// User directories under `root`, sorted. Falls back to `fallback` when there are none.
pub fn list_users(root: &Path, fallback: &str) -> Vec<String> {
    let mut users: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !name.starts_with('.'))
        .collect();

    if users.is_empty() {
        users.push(fallback.to_string());
    }
    users
}
