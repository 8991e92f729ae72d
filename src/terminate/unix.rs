//! SIGTERM, wait, SIGKILL, wait.

use super::{wait_for_exit, Outcome};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::Duration;

pub(super) fn terminate(pid: u32, grace: Duration) -> Outcome {
    // Never let a pid reach kill(2) as 0 or negative: that addresses process groups.
    let pid = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Pid::from_raw(raw),
        _ => return Outcome::OtherError(format!("invalid pid {pid}")),
    };

    if let Err(e) = kill(pid, Signal::SIGTERM) {
        return classify(e);
    }
    if wait_for_exit(grace, || is_alive(pid)) {
        return Outcome::TerminatedGracefully;
    }

    if let Err(e) = kill(pid, Signal::SIGKILL) {
        return classify(e);
    }
    if wait_for_exit(grace, || is_alive(pid)) {
        Outcome::TerminatedForcibly
    } else {
        Outcome::TerminationTimedOut
    }
}

fn classify(e: Errno) -> Outcome {
    match e {
        Errno::ESRCH => Outcome::NotFound,
        Errno::EPERM => Outcome::AccessDenied,
        other => Outcome::OtherError(format!("error: {other}")),
    }
}

fn is_alive(pid: Pid) -> bool {
    match kill(pid, None) {
        Ok(()) => !is_zombie(pid),
        Err(Errno::ESRCH) => false,
        // EPERM: exists but owned by someone else
        Err(_) => true,
    }
}

/// An exited but unreaped child still answers signal 0.
#[cfg(target_os = "linux")]
fn is_zombie(pid: Pid) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let rest = &stat[stat.rfind(')')? + 1..];
            rest.split_whitespace().next().map(|s| s == "Z" || s == "X")
        })
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: Pid) -> bool {
    false
}
