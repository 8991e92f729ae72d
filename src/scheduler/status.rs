//! Status published to observers after each evaluation.

use super::state::Evaluation;
use crate::terminate::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warn,
    Info,
}

/// How new target processes are noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    EventAndPoll,
    PollOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub message: String,
    pub severity: Severity,
    pub detection: DetectionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    pub at: DateTime<Utc>,
}

impl Status {
    pub fn new(message: impl Into<String>, severity: Severity, detection: DetectionMode) -> Self {
        let mut message = message.into();
        if detection == DetectionMode::PollOnly {
            message.push_str(" (polling only)");
        }
        Self {
            message,
            severity,
            detection,
            outcome: None,
            at: Utc::now(),
        }
    }

    pub fn initial(detection: DetectionMode) -> Self {
        Self::new("Checking...", Severity::Info, detection)
    }

    fn with_outcome(mut self, outcome: &Outcome) -> Self {
        self.outcome = Some(outcome.clone());
        self
    }

    /// Ignores the timestamp; used to suppress repeated identical updates.
    pub fn same_as(&self, other: &Status) -> bool {
        self.message == other.message
            && self.severity == other.severity
            && self.detection == other.detection
            && self.outcome == other.outcome
    }

    /// Status text for a completed evaluation; `None` when the check was skipped.
    pub fn describe(
        eval: &Evaluation,
        target: &str,
        manual: bool,
        elevated: bool,
        detection: DetectionMode,
    ) -> Option<Self> {
        let status = match eval {
            Evaluation::Skipped(_) => return None,
            Evaluation::Absent => Self::new(format!("{target} not running"), Severity::Ok, detection),
            Evaluation::Detected(_) => Self::new(
                format!("{target} detected (not killing)"),
                Severity::Warn,
                detection,
            ),
            Evaluation::Acted { outcome, .. } if outcome.is_success() => {
                let message = if manual {
                    format!("{target} {} (manual)", outcome.label())
                } else {
                    format!("{target} detected & auto-killed")
                };
                Self::new(message, Severity::Info, detection).with_outcome(outcome)
            }
            Evaluation::Acted { outcome, .. } => {
                let message = match outcome {
                    Outcome::AccessDenied if !elevated => {
                        "Access denied: try running as administrator".to_string()
                    }
                    Outcome::AccessDenied => format!("Access denied: {target} is protected"),
                    other => format!("Kill failed: {}", other.label()),
                };
                Self::new(message, Severity::Warn, detection).with_outcome(outcome)
            }
        };
        Some(status)
    }
}
