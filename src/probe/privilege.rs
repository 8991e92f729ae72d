//! Whether this process runs with administrative rights.
//! Drives the wording of access-denied status messages.

#[cfg(unix)]
pub fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(windows)]
pub fn is_elevated() -> bool {
    // SAFETY: no arguments, reads the current token only.
    unsafe { windows::Win32::UI::Shell::IsUserAnAdmin().as_bool() }
}

#[cfg(not(any(unix, windows)))]
pub fn is_elevated() -> bool {
    false
}
