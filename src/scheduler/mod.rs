//! Adaptive polling state machine and the runtime that drives it.

mod engine;
mod state;
mod status;

pub use engine::{EventSubscription, OpenSource, Watchdog, WatchdogBuilder};
pub use state::{evaluate, Evaluation, ScanState, SkipReason, Trigger};
pub use status::{DetectionMode, Severity, Status};
