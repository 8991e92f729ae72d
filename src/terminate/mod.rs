//! Graceful-then-forced termination of a resolved target process.
//!
//! Every OS failure is absorbed here and classified into an [`Outcome`]; the
//! scheduler never sees an error type from this module.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod win32;

#[cfg(unix)]
use self::unix as imp;
#[cfg(windows)]
use self::win32 as imp;

use crate::probe::ProcessHandle;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of one detection + termination cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// Target absent, or already gone when a termination step ran
    NotFound,
    TerminatedGracefully,
    TerminatedForcibly,
    /// Still alive after both the graceful and the forced step
    TerminationTimedOut,
    AccessDenied,
    OtherError(String),
}

impl Outcome {
    /// The target is no longer running (a vanished process counts).
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Outcome::NotFound | Outcome::TerminatedGracefully | Outcome::TerminatedForcibly
        )
    }

    /// Short wording used in status messages and logs.
    pub fn label(&self) -> &str {
        match self {
            Outcome::NotFound => "gone",
            Outcome::TerminatedGracefully => "terminated",
            Outcome::TerminatedForcibly => "killed",
            Outcome::TerminationTimedOut => "timeout",
            Outcome::AccessDenied => "access denied",
            Outcome::OtherError(detail) => detail,
        }
    }
}

/// Terminates a process handle resolved during the current check.
pub trait Terminate: Send + Sync {
    /// Blocks for at most twice the grace period.
    fn terminate(&self, handle: &ProcessHandle) -> Outcome;
}

pub struct Terminator {
    grace: Duration,
}

impl Terminator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl Terminate for Terminator {
    fn terminate(&self, handle: &ProcessHandle) -> Outcome {
        let started = Instant::now();
        let outcome = imp::terminate(handle.pid, self.grace);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if outcome.is_success() {
            info!(pid = handle.pid, name = %handle.name, outcome = outcome.label(), elapsed_ms, "target terminated");
        } else {
            warn!(pid = handle.pid, name = %handle.name, outcome = outcome.label(), elapsed_ms, "termination failed");
        }
        outcome
    }
}

/// Poll `alive` until it reports false or `timeout` passes. Returns true on exit.
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn wait_for_exit(timeout: Duration, mut alive: impl FnMut() -> bool) -> bool {
    const STEP: Duration = Duration::from_millis(20);
    let deadline = Instant::now() + timeout;
    loop {
        if !alive() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(STEP.min(deadline - now));
    }
}
