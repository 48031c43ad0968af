//! Configuration module for pipeflow
//!
//! Settings are read from a TOML file with three tables:
//!
//! ```toml
//! [runner]
//! thread_name = "pipeline-runner"
//! max_restarts = 5
//! restart_backoff_ms = 100
//! start_in_benchmark_mode = false
//!
//! [logging]
//! filter = "info,pipeflow=debug"
//! log_dir = "/var/log/pipeflow"
//!
//! [metrics]
//! history_len = 64
//! ```
//!
//! # Settings Location
//!
//! The default settings file lives in the platform config directory:
//! - **Linux**: `~/.config/pipeflow/settings.toml`
//! - **macOS**: `~/Library/Application Support/pipeflow/settings.toml`
//! - **Windows**: `%APPDATA%\pipeflow\settings.toml`

pub mod settings;

pub use settings::*;

use crate::error::{PipeflowError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "pipeflow";

/// Settings filename
pub const SETTINGS_FILE: &str = "settings.toml";

/// Get the platform config directory for pipeflow
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default settings file
pub fn default_settings_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(SETTINGS_FILE))
}

/// All runtime settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub runner: RunnerSettings,
    pub logging: LoggingSettings,
    pub metrics: MetricsSettings,
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PipeflowError::Config(format!("Failed to parse settings: {}", e)))
    }

    /// Load settings from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load settings, returning defaults if the file is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save settings, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PipeflowError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
