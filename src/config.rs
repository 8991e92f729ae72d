//! Watchdog configuration. The target definition is fixed at startup; only the
//! monitoring switch is user-controlled at runtime (see [`crate::policy`]).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Process to watch and the polling policy around it
    pub target: TargetConfig,
    /// OS process-creation notifications
    pub watcher: WatcherConfig,
    /// Persisted user settings (monitoring switch)
    pub settings_path: PathBuf,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Executable name, matched case-insensitively
    pub process_name: String,
    /// Wait after each termination step (ms)
    pub grace_period_ms: u64,
    pub min_interval_ms: u64,
    pub normal_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Interval growth per empty scan (ms)
    pub backoff_step_ms: u64,
    /// Bounds of the suspension armed after a failed termination (ms)
    pub fail_backoff_floor_ms: u64,
    pub fail_backoff_max_ms: u64,
    /// Scan suppression window after a successful termination (ms)
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    /// Upper bound on a single blocking wait for notifications (ms)
    pub poll_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            watcher: WatcherConfig::default(),
            settings_path: default_settings_path(),
            log: LogConfig::default(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            process_name: "pickerhost.exe".to_string(),
            grace_period_ms: 500,
            min_interval_ms: 400,
            normal_interval_ms: 2000,
            max_interval_ms: 15000,
            backoff_step_ms: 2000,
            fail_backoff_floor_ms: 1500,
            fail_backoff_max_ms: 12000,
            cooldown_ms: 300,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_timeout_ms: 2000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("procwarden")
        .join("settings.json")
}

impl WatchdogConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<WatchdogConfig>(&data) {
                    Ok(c) => return c,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "config malformed; using defaults")
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "config unreadable; using defaults")
                }
            }
        }
        Self::default()
    }
}

/// Validated, immutable description of the watched process and its polling policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    name: String,
    pub grace_period: Duration,
    pub min_interval: Duration,
    pub normal_interval: Duration,
    pub max_interval: Duration,
    pub backoff_step: Duration,
    pub fail_backoff_floor: Duration,
    pub fail_backoff_max: Duration,
    pub cooldown: Duration,
}

impl TargetSpec {
    pub fn from_config(c: &TargetConfig) -> Result<Self, ConfigError> {
        let name = c.process_name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyTargetName);
        }
        if c.min_interval_ms == 0
            || c.min_interval_ms > c.normal_interval_ms
            || c.normal_interval_ms > c.max_interval_ms
        {
            return Err(ConfigError::IntervalBounds {
                min: c.min_interval_ms,
                normal: c.normal_interval_ms,
                max: c.max_interval_ms,
            });
        }
        if c.fail_backoff_floor_ms > c.fail_backoff_max_ms {
            return Err(ConfigError::BackoffBounds {
                floor: c.fail_backoff_floor_ms,
                ceiling: c.fail_backoff_max_ms,
            });
        }
        if c.grace_period_ms == 0 {
            return Err(ConfigError::ZeroGracePeriod);
        }
        Ok(Self {
            name: name.to_string(),
            grace_period: Duration::from_millis(c.grace_period_ms),
            min_interval: Duration::from_millis(c.min_interval_ms),
            normal_interval: Duration::from_millis(c.normal_interval_ms),
            max_interval: Duration::from_millis(c.max_interval_ms),
            backoff_step: Duration::from_millis(c.backoff_step_ms),
            fail_backoff_floor: Duration::from_millis(c.fail_backoff_floor_ms),
            fail_backoff_max: Duration::from_millis(c.fail_backoff_max_ms),
            cooldown: Duration::from_millis(c.cooldown_ms),
        })
    }

    /// Target executable name as configured
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, candidate: &str) -> bool {
        candidate.eq_ignore_ascii_case(&self.name)
    }

    pub fn clamp_interval(&self, d: Duration) -> Duration {
        d.clamp(self.min_interval, self.max_interval)
    }
}

impl Default for TargetSpec {
    fn default() -> Self {
        // Defaults are always valid.
        let c = TargetConfig::default();
        Self {
            name: c.process_name,
            grace_period: Duration::from_millis(c.grace_period_ms),
            min_interval: Duration::from_millis(c.min_interval_ms),
            normal_interval: Duration::from_millis(c.normal_interval_ms),
            max_interval: Duration::from_millis(c.max_interval_ms),
            backoff_step: Duration::from_millis(c.backoff_step_ms),
            fail_backoff_floor: Duration::from_millis(c.fail_backoff_floor_ms),
            fail_backoff_max: Duration::from_millis(c.fail_backoff_max_ms),
            cooldown: Duration::from_millis(c.cooldown_ms),
        }
    }
}
