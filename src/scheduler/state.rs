//! Scan state and the transition applied on every trigger.
//!
//! Modes are implicit in the fields:
//! - Quiet: nothing pending; each empty scan grows the interval by the step.
//! - Burst: after a successful termination the interval snaps to `min` and
//!   the next scan inside the cooldown window is skipped.
//! - FailBackoff: after a failed termination the interval doubles and scans
//!   are suspended until the armed backoff has counted down.
//! - Passive: monitoring disabled; detection is reported, nothing is touched.

use crate::config::TargetSpec;
use crate::probe::{Probe, ProcessHandle};
use crate::terminate::{Outcome, Terminate};
use std::time::{Duration, Instant};

/// What caused an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    /// Process-creation notification
    Event,
    /// User-requested fix: bypasses cooldown, backoff and the monitoring switch
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Cooldown,
    Backoff { remaining: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Skipped(SkipReason),
    Absent,
    /// Target present, monitoring disabled
    Detected(ProcessHandle),
    Acted {
        handle: ProcessHandle,
        outcome: Outcome,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    interval: Duration,
    backoff: Duration,
    cooldown_until: Option<Instant>,
}

impl ScanState {
    pub fn new(spec: &TargetSpec) -> Self {
        Self {
            interval: spec.normal_interval,
            backoff: Duration::ZERO,
            cooldown_until: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    fn grow_quiet(&mut self, spec: &TargetSpec) {
        self.interval = spec.clamp_interval(self.interval + spec.backoff_step);
    }

    fn reset_quiet(&mut self, spec: &TargetSpec) {
        self.interval = spec.normal_interval;
        self.backoff = Duration::ZERO;
    }

    fn enter_burst(&mut self, spec: &TargetSpec, at: Instant) {
        self.interval = spec.min_interval;
        self.backoff = Duration::ZERO;
        self.cooldown_until = (!spec.cooldown.is_zero()).then(|| at + spec.cooldown);
    }

    fn enter_fail_backoff(&mut self, spec: &TargetSpec) {
        let doubled = self.interval.saturating_mul(2);
        self.backoff = doubled.clamp(spec.fail_backoff_floor, spec.fail_backoff_max);
        self.interval = spec.clamp_interval(doubled);
        self.cooldown_until = None;
    }

    /// Cooldown and backoff gates. Returns a skip reason when this trigger must not probe.
    fn gate(&mut self, now: Instant) -> Option<SkipReason> {
        // One-shot: the deadline suppresses at most one scan.
        if let Some(until) = self.cooldown_until.take() {
            if now < until {
                return Some(SkipReason::Cooldown);
            }
        }
        if !self.backoff.is_zero() {
            self.backoff = self.backoff.saturating_sub(self.interval);
            if !self.backoff.is_zero() {
                return Some(SkipReason::Backoff {
                    remaining: self.backoff,
                });
            }
        }
        None
    }
}

/// Run one evaluation. The monitoring flag is sampled by the caller once,
/// before the evaluation starts.
pub fn evaluate(
    state: &mut ScanState,
    spec: &TargetSpec,
    now: Instant,
    trigger: Trigger,
    monitoring: bool,
    probe: &dyn Probe,
    terminator: &dyn Terminate,
) -> Evaluation {
    let manual = trigger == Trigger::Manual;
    if !manual {
        if let Some(reason) = state.gate(now) {
            return Evaluation::Skipped(reason);
        }
    }

    let Some(handle) = probe.find_target(spec) else {
        if manual {
            state.reset_quiet(spec);
        } else {
            state.grow_quiet(spec);
        }
        return Evaluation::Absent;
    };

    if !monitoring && !manual {
        state.grow_quiet(spec);
        return Evaluation::Detected(handle);
    }

    let started = Instant::now();
    let outcome = terminator.terminate(&handle);
    // Cooldown runs from when the kill completed, on the caller's clock.
    let done = now + started.elapsed();
    if outcome.is_success() {
        state.enter_burst(spec, done);
    } else {
        state.enter_fail_backoff(spec);
    }
    Evaluation::Acted { handle, outcome }
}
