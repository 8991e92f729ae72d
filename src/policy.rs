//! The monitoring switch: whether a detected target is terminated or only reported.

use crate::storage::{SettingsStore, UserSettings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared, cheaply cloneable flag. Readers sample it once per evaluation, so a
/// toggle during an in-flight termination applies to the next check.
#[derive(Clone)]
pub struct PolicySwitch {
    enabled: Arc<AtomicBool>,
    store: Option<Arc<SettingsStore>>,
}

impl PolicySwitch {
    /// In-memory only.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
            store: None,
        }
    }

    /// Initial value from the store; every change is written back.
    pub fn persisted(store: SettingsStore) -> Self {
        let enabled = match store.load() {
            Ok(s) => s.monitoring,
            Err(e) => {
                warn!(error = %e, "settings unreadable; monitoring enabled");
                UserSettings::default().monitoring
            }
        };
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
            store: Some(Arc::new(store)),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::AcqRel);
        if previous == enabled {
            return;
        }
        info!(enabled, "monitoring switched");
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&UserSettings {
                monitoring: enabled,
            }) {
                warn!(error = %e, "failed to persist monitoring switch");
            }
        }
    }

    /// Flip the switch; returns the new value.
    pub fn toggle(&self) -> bool {
        let next = !self.enabled();
        self.set(next);
        next
    }
}
