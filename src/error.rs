use std::path::PathBuf;
use thiserror::Error;

/// Rejected watchdog configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("target process name is empty")]
    EmptyTargetName,

    #[error("poll intervals must satisfy 0 < min <= normal <= max (got {min}/{normal}/{max} ms)")]
    IntervalBounds { min: u64, normal: u64, max: u64 },

    #[error("fail backoff floor {floor} ms exceeds ceiling {ceiling} ms")]
    BackoffBounds { floor: u64, ceiling: u64 },

    #[error("grace period must be non-zero")]
    ZeroGracePeriod,
}

/// Failure reading or writing persisted user settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("settings io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SettingsError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_error_mentions_bounds() {
        let e = ConfigError::IntervalBounds {
            min: 500,
            normal: 400,
            max: 15000,
        };
        let msg = e.to_string();
        assert!(msg.contains("500/400/15000"));
    }
}
