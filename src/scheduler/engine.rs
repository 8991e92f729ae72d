//! Watchdog runtime: a single evaluation loop fed by its own timer, by
//! process-creation events and by manual requests.
//!
//! All triggers funnel through one command queue, so evaluations never
//! overlap and [`ScanState`] is only touched by the loop. Event and manual
//! checks do not move the timer's next deadline.

use super::state::{evaluate, Evaluation, ScanState, Trigger};
use super::status::{DetectionMode, Status};
use crate::config::TargetSpec;
use crate::policy::PolicySwitch;
use crate::probe::{is_elevated, Probe, ProcessProbe};
use crate::terminate::{Terminate, Terminator};
use crate::watcher::{CreationSource, EventWatcher};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Command {
    CheckNow,
    ForceCheck(oneshot::Sender<Status>),
    Shutdown,
}

pub type OpenSource = Box<dyn FnOnce() -> io::Result<Box<dyn CreationSource>> + Send>;

/// Where creation events come from.
pub enum EventSubscription {
    /// The host's mechanism (proc connector on Linux, WMI on Windows)
    Native { poll_timeout: Duration },
    Off,
    Custom {
        poll_timeout: Duration,
        open: OpenSource,
    },
}

pub struct WatchdogBuilder {
    spec: TargetSpec,
    policy: PolicySwitch,
    probe: Option<Arc<dyn Probe>>,
    terminator: Option<Arc<dyn Terminate>>,
    events: EventSubscription,
}

impl WatchdogBuilder {
    pub fn policy(mut self, policy: PolicySwitch) -> Self {
        self.policy = policy;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn terminator(mut self, terminator: Arc<dyn Terminate>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn events(mut self, events: EventSubscription) -> Self {
        self.events = events;
        self
    }

    /// Subscribe to events, run the first check and start the loop.
    /// Attaching to the notification source blocks, so it runs on the
    /// blocking pool; the caller's runtime keeps serving other tasks.
    pub async fn start(self) -> Watchdog {
        let WatchdogBuilder {
            spec,
            policy,
            probe,
            terminator,
            events,
        } = self;
        let spec = Arc::new(spec);
        let probe = probe.unwrap_or_else(|| Arc::new(ProcessProbe::new()) as Arc<dyn Probe>);
        let terminator = terminator
            .unwrap_or_else(|| Arc::new(Terminator::new(spec.grace_period)) as Arc<dyn Terminate>);
        let (commands, rx) = mpsc::unbounded_channel();

        let poll_timeout = match &events {
            EventSubscription::Native { poll_timeout }
            | EventSubscription::Custom { poll_timeout, .. } => *poll_timeout,
            EventSubscription::Off => Duration::from_secs(2),
        };
        let watcher = Arc::new(EventWatcher::new(poll_timeout));
        let notify = commands.clone();
        let on_detect = move || {
            let _ = notify.send(Command::CheckNow);
        };
        let attaching = Arc::clone(&watcher);
        let target = spec.name().to_string();
        let attached = tokio::task::spawn_blocking(move || match events {
            EventSubscription::Native { .. } => attaching.start(&target, on_detect),
            EventSubscription::Custom { open, .. } => attaching.start_with(open, on_detect),
            EventSubscription::Off => false,
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "event subscription task failed");
            false
        });
        let detection = if attached {
            DetectionMode::EventAndPoll
        } else {
            DetectionMode::PollOnly
        };
        info!(target_name = spec.name(), ?detection, monitoring = policy.enabled(), "watchdog starting");

        let (status_tx, status_rx) = watch::channel(Status::initial(detection));
        let runner = Runner {
            state: ScanState::new(&spec),
            spec,
            probe,
            terminator,
            policy: policy.clone(),
            status: status_tx,
            detection,
            elevated: is_elevated(),
        };
        let task = tokio::spawn(runner.run(rx));

        Watchdog {
            commands,
            status: status_rx,
            policy,
            watcher,
            task: Mutex::new(Some(task)),
            detection,
        }
    }
}

pub struct Watchdog {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<Status>,
    policy: PolicySwitch,
    watcher: Arc<EventWatcher>,
    task: Mutex<Option<JoinHandle<()>>>,
    detection: DetectionMode,
}

impl Watchdog {
    pub fn builder(spec: TargetSpec) -> WatchdogBuilder {
        WatchdogBuilder {
            spec,
            policy: PolicySwitch::new(true),
            probe: None,
            terminator: None,
            events: EventSubscription::Native {
                poll_timeout: Duration::from_secs(2),
            },
        }
    }

    pub fn current_status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Receives every distinct status published after an evaluation.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    pub fn set_monitoring(&self, enabled: bool) {
        self.policy.set(enabled);
    }

    pub fn monitoring(&self) -> bool {
        self.policy.enabled()
    }

    pub fn detection_mode(&self) -> DetectionMode {
        self.detection
    }

    /// Queue an unscheduled check under the normal rules.
    pub fn check_now(&self) {
        let _ = self.commands.send(Command::CheckNow);
    }

    /// Run one manual check and return the status it produced. Ignores
    /// cooldown, backoff and the monitoring switch.
    pub async fn force_check_now(&self) -> Status {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::ForceCheck(reply)).is_err() {
            return self.current_status();
        }
        match done.await {
            Ok(status) => status,
            Err(_) => self.current_status(),
        }
    }

    /// Stop the listener and the loop. A termination already in progress
    /// finishes first. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.watcher.stop();
        let _ = self.commands.send(Command::Shutdown);
        let task = match self.task.lock() {
            Ok(mut t) => t.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "watchdog loop ended abnormally");
            }
        }
        let watcher = Arc::clone(&self.watcher);
        if tokio::task::spawn_blocking(move || watcher.join()).await.is_err() {
            warn!("event listener join failed");
        }
        info!("watchdog stopped");
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.watcher.stop();
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct Runner {
    spec: Arc<TargetSpec>,
    probe: Arc<dyn Probe>,
    terminator: Arc<dyn Terminate>,
    policy: PolicySwitch,
    status: watch::Sender<Status>,
    detection: DetectionMode,
    elevated: bool,
    state: ScanState,
}

impl Runner {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        self.check(Trigger::Timer).await;
        let mut next_tick = tokio::time::Instant::now() + self.state.interval();

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => {
                    self.check(Trigger::Timer).await;
                    next_tick = tokio::time::Instant::now() + self.state.interval();
                }
                cmd = rx.recv() => match cmd {
                    Some(Command::CheckNow) => self.check(Trigger::Event).await,
                    Some(Command::ForceCheck(reply)) => {
                        self.check(Trigger::Manual).await;
                        let _ = reply.send(self.status.borrow().clone());
                    }
                    Some(Command::Shutdown) | None => break,
                },
            }
        }
        debug!("watchdog loop exited");
    }

    async fn check(&mut self, trigger: Trigger) {
        let monitoring = self.policy.enabled();
        let mut state = self.state;
        let spec = Arc::clone(&self.spec);
        let probe = Arc::clone(&self.probe);
        let terminator = Arc::clone(&self.terminator);
        let now = Instant::now();

        // Termination blocks for up to twice the grace period.
        let joined = tokio::task::spawn_blocking(move || {
            let eval = evaluate(
                &mut state,
                &spec,
                now,
                trigger,
                monitoring,
                probe.as_ref(),
                terminator.as_ref(),
            );
            (state, eval)
        })
        .await;
        let (state, eval) = match joined {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, ?trigger, "check aborted");
                return;
            }
        };
        self.state = state;

        debug!(
            ?trigger,
            interval_ms = state.interval().as_millis() as u64,
            backoff_ms = state.backoff().as_millis() as u64,
            result = ?eval,
            "check complete"
        );
        let manual = trigger == Trigger::Manual;
        if let Some(status) =
            Status::describe(&eval, self.spec.name(), manual, self.elevated, self.detection)
        {
            self.publish(status);
        }
        if let Evaluation::Detected(handle) = &eval {
            debug!(pid = handle.pid, "target left running (monitoring off)");
        }
    }

    fn publish(&self, status: Status) {
        self.status.send_if_modified(move |current| {
            if current.same_as(&status) {
                return false;
            }
            info!(message = %status.message, severity = ?status.severity, "status changed");
            *current = status;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::state::tests::{FixedTerminator, ScriptProbe};
    use crate::scheduler::status::Severity;
    use crate::terminate::Outcome;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_spec() -> TargetSpec {
        let c = crate::config::TargetConfig {
            process_name: "target.exe".into(),
            grace_period_ms: 10,
            min_interval_ms: 20,
            normal_interval_ms: 40,
            max_interval_ms: 200,
            backoff_step_ms: 20,
            fail_backoff_floor_ms: 30,
            fail_backoff_max_ms: 240,
            cooldown_ms: 15,
        };
        TargetSpec::from_config(&c).unwrap()
    }

    #[tokio::test]
    async fn startup_check_publishes_status() {
        let probe = Arc::new(ScriptProbe::always(false));
        let dog = Watchdog::builder(fast_spec())
            .probe(probe.clone())
            .terminator(Arc::new(FixedTerminator::new(Outcome::TerminatedGracefully)))
            .events(EventSubscription::Off)
            .start()
            .await;
        let mut rx = dog.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        let s = dog.current_status();
        assert_eq!(s.message, "target.exe not running (polling only)");
        assert_eq!(s.severity, Severity::Ok);
        assert_eq!(dog.detection_mode(), DetectionMode::PollOnly);
        dog.shutdown().await;
    }

    #[tokio::test]
    async fn force_check_kills_even_when_monitoring_off() {
        let term = Arc::new(FixedTerminator::new(Outcome::TerminatedForcibly));
        let dog = Watchdog::builder(fast_spec())
            .policy(PolicySwitch::new(false))
            .probe(Arc::new(ScriptProbe::new([false, true])))
            .terminator(term.clone())
            .events(EventSubscription::Off)
            .start()
            .await;
        let s = dog.force_check_now().await;
        assert_eq!(s.message, "target.exe killed (manual) (polling only)");
        assert_eq!(term.calls.load(Ordering::SeqCst), 1);
        dog.shutdown().await;
    }

    /// Attached source that never reports anything.
    struct Idle;

    impl CreationSource for Idle {
        fn next_creations(&mut self, timeout: Duration) -> io::Result<usize> {
            std::thread::sleep(timeout);
            Ok(0)
        }
    }

    #[tokio::test]
    async fn slow_subscription_does_not_stall_runtime() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let ticker = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });
        let open: OpenSource = Box::new(|| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Box::new(Idle) as Box<dyn CreationSource>)
        });
        let dog = Watchdog::builder(fast_spec())
            .probe(Arc::new(ScriptProbe::always(false)))
            .terminator(Arc::new(FixedTerminator::new(Outcome::NotFound)))
            .events(EventSubscription::Custom {
                poll_timeout: Duration::from_millis(20),
                open,
            })
            .start()
            .await;
        // Single-threaded test runtime: the ticker only ran if start yielded.
        assert!(ticks.load(Ordering::SeqCst) >= 5, "ticks = {}", ticks.load(Ordering::SeqCst));
        assert_eq!(dog.detection_mode(), DetectionMode::EventAndPoll);
        ticker.abort();
        dog.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let dog = Watchdog::builder(fast_spec())
            .probe(Arc::new(ScriptProbe::always(false)))
            .terminator(Arc::new(FixedTerminator::new(Outcome::NotFound)))
            .events(EventSubscription::Off)
            .start()
            .await;
        dog.shutdown().await;
        dog.shutdown().await;
        // Loop gone: manual check falls back to the last status.
        let s = dog.force_check_now().await;
        assert!(s.message.starts_with("target.exe") || s.message.starts_with("Checking"));
    }
}
