//! WM_CLOSE to the target's top-level windows, wait, TerminateProcess, wait.

use super::Outcome;
use std::time::Duration;
use windows::Win32::Foundation::{
    CloseHandle, BOOL, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, HANDLE, HWND, LPARAM,
    WAIT_OBJECT_0, WPARAM,
};
use windows::Win32::System::Threading::{
    OpenProcess, TerminateProcess, WaitForSingleObject, PROCESS_SYNCHRONIZE, PROCESS_TERMINATE,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowThreadProcessId, PostMessageW, WM_CLOSE,
};

struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: handle came from OpenProcess and is closed once.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

pub(super) fn terminate(pid: u32, grace: Duration) -> Outcome {
    // SAFETY: plain Win32 call; the returned handle is owned by the guard.
    let handle = match unsafe { OpenProcess(PROCESS_TERMINATE | PROCESS_SYNCHRONIZE, false, pid) } {
        Ok(h) => OwnedHandle(h),
        Err(e) => return classify(&e),
    };

    request_close(pid);
    if wait(&handle, grace) {
        return Outcome::TerminatedGracefully;
    }

    // SAFETY: valid process handle opened with PROCESS_TERMINATE.
    if let Err(e) = unsafe { TerminateProcess(handle.0, 1) } {
        // Exited between the wait and the kill.
        if wait(&handle, Duration::ZERO) {
            return Outcome::NotFound;
        }
        return classify(&e);
    }
    if wait(&handle, grace) {
        Outcome::TerminatedForcibly
    } else {
        Outcome::TerminationTimedOut
    }
}

fn classify(e: &windows::core::Error) -> Outcome {
    if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
        Outcome::AccessDenied
    } else if e.code() == ERROR_INVALID_PARAMETER.to_hresult() {
        // No process with this id any more.
        Outcome::NotFound
    } else {
        Outcome::OtherError(format!("error: {e}"))
    }
}

fn wait(handle: &OwnedHandle, timeout: Duration) -> bool {
    let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
    // SAFETY: handle opened with PROCESS_SYNCHRONIZE.
    unsafe { WaitForSingleObject(handle.0, ms) == WAIT_OBJECT_0 }
}

struct CloseRequest {
    pid: u32,
    posted: u32,
}

unsafe extern "system" fn post_close(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let req = &mut *(lparam.0 as *mut CloseRequest);
    let mut owner = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut owner));
    if owner == req.pid && PostMessageW(hwnd, WM_CLOSE, WPARAM(0), LPARAM(0)).is_ok() {
        req.posted += 1;
    }
    BOOL(1)
}

/// Cooperative close. Windowless processes get nothing and fall through to the kill.
fn request_close(pid: u32) {
    let mut req = CloseRequest { pid, posted: 0 };
    // SAFETY: `req` outlives the synchronous enumeration.
    let _ = unsafe { EnumWindows(Some(post_close), LPARAM(&mut req as *mut CloseRequest as isize)) };
    tracing::debug!(pid, windows = req.posted, "close requested");
}
