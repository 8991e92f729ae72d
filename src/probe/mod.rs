//! Target resolution against the OS process table.
//! Platform-specific privilege check; shared handle type.

mod process;
mod privilege;

pub use privilege::is_elevated;
pub use process::ProcessProbe;

use crate::config::TargetSpec;

/// A live process matched during one check. Never kept across checks: the pid
/// may be reused by an unrelated process once the original exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
}

impl ProcessHandle {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// Finds the target process, if running. Read-only.
pub trait Probe: Send + Sync {
    fn find_target(&self, spec: &TargetSpec) -> Option<ProcessHandle>;
}

/// Pick the match deterministically from (pid, name) pairs.
pub(crate) fn select_target<'a, I>(entries: I, spec: &TargetSpec) -> Option<ProcessHandle>
where
    I: IntoIterator<Item = (u32, &'a str)>,
{
    entries
        .into_iter()
        .filter(|(_, name)| spec.matches(name))
        .min_by_key(|(pid, _)| *pid)
        .map(|(pid, name)| ProcessHandle::new(pid, name))
}
