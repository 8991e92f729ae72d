//! Process table lookup (cross-platform via sysinfo).

use super::{select_target, Probe, ProcessHandle};
use crate::config::TargetSpec;
use std::sync::Mutex;
use sysinfo::System;

pub struct ProcessProbe {
    sys: Mutex<System>,
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }
}

impl ProcessProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Probe for ProcessProbe {
    /// Refresh the process list and match by executable name. Entries that
    /// vanish mid-refresh are simply absent from the table.
    fn find_target(&self, spec: &TargetSpec) -> Option<ProcessHandle> {
        let mut sys = match self.sys.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        sys.refresh_processes();

        let found = select_target(
            sys.processes()
                .iter()
                .map(|(pid, proc_)| (pid.as_u32(), proc_.name())),
            spec,
        );
        tracing::trace!(target_name = spec.name(), found = found.is_some(), "probe");
        found
    }
}
