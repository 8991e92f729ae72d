//! Best-effort process-creation notifications for the target name.
//!
//! The listener runs on its own OS thread and only signals "check now"
//! through the callback it was started with; it never probes or terminates.
//! Notifications are advisory: dropped events are covered by the periodic
//! poll. When the host offers no usable notification source the watcher
//! reports unavailable and the watchdog runs on polling alone.

#[cfg(target_os = "linux")]
mod proc_connector;
#[cfg(windows)]
mod wmi_events;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long `start` waits for the listener thread to attach.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause after a failed wait so a broken source cannot spin.
const ERROR_PAUSE: Duration = Duration::from_millis(250);

/// A subscription to OS process-creation events, filtered by target name.
pub trait CreationSource {
    /// Block up to `timeout`; returns the number of matching creations seen.
    fn next_creations(&mut self, timeout: Duration) -> io::Result<usize>;
}

impl<S: CreationSource + ?Sized> CreationSource for Box<S> {
    fn next_creations(&mut self, timeout: Duration) -> io::Result<usize> {
        (**self).next_creations(timeout)
    }
}

struct Listener {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct EventWatcher {
    poll_timeout: Duration,
    running: Mutex<Option<Listener>>,
    stopping: Mutex<Vec<JoinHandle<()>>>,
    available: AtomicBool,
}

impl EventWatcher {
    pub fn new(poll_timeout: Duration) -> Self {
        Self {
            poll_timeout,
            running: Mutex::new(None),
            stopping: Mutex::new(Vec::new()),
            available: AtomicBool::new(false),
        }
    }

    /// Subscribe with the host's native notification mechanism.
    /// Returns whether a subscription is active.
    pub fn start<F>(&self, target: &str, on_detect: F) -> bool
    where
        F: Fn() + Send + 'static,
    {
        #[cfg(target_os = "linux")]
        {
            let target = target.to_string();
            self.start_with(move || proc_connector::ProcConnector::open(&target), on_detect)
        }
        #[cfg(windows)]
        {
            let target = target.to_string();
            self.start_with(move || wmi_events::WmiCreationSource::open(&target), on_detect)
        }
        #[cfg(not(any(target_os = "linux", windows)))]
        {
            let _ = on_detect;
            info!(target_name = target, "no process-creation notifications on this platform");
            false
        }
    }

    /// Subscribe with a caller-provided source. `open` runs on the listener
    /// thread so thread-affine sources (COM) stay on the thread that uses them.
    /// Blocks until the listener reports attached, at most five seconds.
    pub fn start_with<S, O, F>(&self, open: O, on_detect: F) -> bool
    where
        S: CreationSource + 'static,
        O: FnOnce() -> io::Result<S> + Send + 'static,
        F: Fn() + Send + 'static,
    {
        let mut running = lock(&self.running);
        if running.is_some() {
            return self.available();
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_stop = Arc::clone(&stop);
        let poll_timeout = self.poll_timeout;

        let spawned = std::thread::Builder::new()
            .name("procwarden-events".into())
            .spawn(move || {
                let source = match open() {
                    Ok(s) => {
                        let _ = ready_tx.send(true);
                        s
                    }
                    Err(e) => {
                        info!(error = %e, "process-creation subscription unavailable");
                        let _ = ready_tx.send(false);
                        return;
                    }
                };
                listen(source, &thread_stop, poll_timeout, on_detect);
            });
        let thread = match spawned {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to spawn event listener");
                return false;
            }
        };

        let attached = ready_rx.recv_timeout(ATTACH_TIMEOUT).unwrap_or(false);
        if attached {
            *running = Some(Listener { stop, thread });
        } else {
            stop.store(true, Ordering::Release);
            lock(&self.stopping).push(thread);
        }
        self.available.store(attached, Ordering::Release);
        attached
    }

    /// Ask the listener to exit. Idempotent; never blocks.
    pub fn stop(&self) {
        if let Some(listener) = lock(&self.running).take() {
            listener.stop.store(true, Ordering::Release);
            lock(&self.stopping).push(listener.thread);
            debug!("event listener stop requested");
        }
    }

    /// Wait for stopped listeners to exit; bounded by the poll timeout.
    pub fn join(&self) {
        let threads: Vec<_> = lock(&self.stopping).drain(..).collect();
        for t in threads {
            if t.join().is_err() {
                warn!("event listener panicked");
            }
        }
    }

    /// Whether the last `start` attached to a notification source.
    pub fn available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen<S, F>(mut source: S, stop: &AtomicBool, timeout: Duration, on_detect: F)
where
    S: CreationSource,
    F: Fn(),
{
    info!("event listener attached");
    while !stop.load(Ordering::Acquire) {
        match source.next_creations(timeout) {
            Ok(0) => {}
            Ok(n) => {
                debug!(count = n, "target creation observed");
                for _ in 0..n {
                    on_detect();
                }
            }
            Err(e) => {
                debug!(error = %e, "notification wait failed");
                std::thread::sleep(ERROR_PAUSE.min(timeout));
            }
        }
    }
    debug!("event listener exited");
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}
