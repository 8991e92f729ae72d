//! procwarden: watches for a named process and terminates it, polling
//! adaptively and backing off when termination fails.
//!
//! Modular structure:
//! - [`probe`]: Target lookup in the OS process table
//! - [`terminate`]: Graceful-then-forced termination, classified outcomes
//! - [`watcher`]: Optional process-creation notifications
//! - [`scheduler`]: Polling state machine and watchdog runtime
//! - [`policy`]: Monitoring switch, persisted via [`storage`]
//! - [`logging`]: Structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod policy;
pub mod probe;
pub mod scheduler;
pub mod storage;
pub mod terminate;
pub mod watcher;

pub use config::{TargetSpec, WatchdogConfig};
pub use logging::StructuredLogger;
pub use policy::PolicySwitch;
pub use probe::{ProcessHandle, ProcessProbe};
pub use scheduler::{DetectionMode, EventSubscription, Severity, Status, Watchdog};
pub use storage::{InstanceLock, SettingsStore};
pub use terminate::{Outcome, Terminator};
pub use watcher::EventWatcher;
