//! Local persistence for user-controlled settings, and the lock that keeps
//! a single watchdog instance per user.

mod lock;
mod settings;

pub use lock::InstanceLock;
pub use settings::{SettingsStore, UserSettings};
