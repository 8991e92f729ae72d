//! User settings persisted across restarts (JSON file).

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Terminate the target when detected (otherwise report only)
    pub monitoring: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self { monitoring: true }
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing file means first run: defaults.
    pub fn load(&self) -> Result<UserSettings, SettingsError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(UserSettings::default())
            }
            Err(e) => return Err(SettingsError::io(&self.path, e)),
        };
        serde_json::from_str(&data).map_err(|source| SettingsError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Write via a sibling temp file and rename, so readers never see a partial file.
    pub fn save(&self, settings: &UserSettings) -> Result<(), SettingsError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| SettingsError::io(dir, e))?;
        }
        let json = serde_json::to_string_pretty(settings).map_err(|source| {
            SettingsError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| SettingsError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| SettingsError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_defaults_to_monitoring() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nope.json"));
        assert_eq!(store.load().unwrap(), UserSettings { monitoring: true });
    }

    #[test]
    fn save_then_load_in_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
        store.save(&UserSettings { monitoring: false }).unwrap();
        assert_eq!(store.load().unwrap(), UserSettings { monitoring: false });
        assert!(!dir.path().join("nested").join("settings.json.tmp").exists());
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{monitoring: ").unwrap();
        let err = SettingsStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SettingsError::Malformed { .. }));
    }
}
