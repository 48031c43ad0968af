//! Settings sections
//!
//! Each table of the settings file maps to one struct here. Every field has a
//! serde default so a partial file (or an empty one) still loads.
//!
//! # Sections
//!
//! - [`RunnerSettings`] - Scheduler thread and restart policy
//! - [`LoggingSettings`] - Log filter and optional log directory
//! - [`MetricsSettings`] - Timing history kept per step

use crate::pipeline::metrics::DEFAULT_HISTORY_LEN;
use crate::pipeline::service::RestartPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default scheduler thread name
pub const DEFAULT_THREAD_NAME: &str = "pipeline-runner";

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,pipeflow=debug";

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Name of the scheduler thread
    pub thread_name: String,

    /// Restarts allowed after the pass loop fails; unlimited when absent
    pub max_restarts: Option<u32>,

    /// Delay before each restart, in milliseconds
    pub restart_backoff_ms: u64,

    /// Start with benchmarking mode on (sources frozen, every step forced)
    pub start_in_benchmark_mode: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            max_restarts: None,
            restart_backoff_ms: 0,
            start_in_benchmark_mode: false,
        }
    }
}

impl RunnerSettings {
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            max_restarts: self.max_restarts,
            backoff: Duration::from_millis(self.restart_backoff_ms),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,

    /// Directory for daily log files; console only when absent
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
        }
    }
}

/// Metrics settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Samples kept per timed target
    pub history_len: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            history_len: DEFAULT_HISTORY_LEN,
        }
    }
}
