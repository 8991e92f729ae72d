//! procwarden entrypoint: headless watchdog. Runs until Ctrl+C, logging each
//! status change; `--once` performs a single manual fix and exits.

use procwarden::{
    config::{TargetSpec, WatchdogConfig},
    logging::StructuredLogger,
    policy::PolicySwitch,
    scheduler::{EventSubscription, Watchdog},
    storage::{InstanceLock, SettingsStore},
};
use std::time::Duration;
use tracing::{info, warn};

async fn run(config: WatchdogConfig, spec: TargetSpec, once: bool) {
    let policy = PolicySwitch::persisted(SettingsStore::new(&config.settings_path));
    let events = if config.watcher.enabled {
        EventSubscription::Native {
            poll_timeout: Duration::from_millis(config.watcher.poll_timeout_ms),
        }
    } else {
        EventSubscription::Off
    };

    let watchdog = Watchdog::builder(spec)
        .policy(policy)
        .events(events)
        .start()
        .await;

    if once {
        let status = watchdog.force_check_now().await;
        StructuredLogger::emit_json(&status, &mut std::io::stdout());
        watchdog.shutdown().await;
        return;
    }

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let _ = ctrlc::set_handler(move || {
        let _ = stop_tx.send(true);
    });

    info!(monitoring = watchdog.monitoring(), "daemon mode (Ctrl+C to stop)");
    let mut status = watchdog.subscribe();
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let s = status.borrow_and_update().clone();
                info!(message = %s.message, severity = ?s.severity, detection = ?s.detection, "status");
            }
            _ = stop_rx.changed() => break,
        }
    }

    info!("procwarden stopping");
    watchdog.shutdown().await;
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("PROCWARDEN_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("procwarden.json"));
    let config = WatchdogConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    let spec = TargetSpec::from_config(&config.target)?;
    let once = std::env::args().skip(1).any(|a| a == "--once");

    let lock_path = InstanceLock::default_path();
    let _instance = match InstanceLock::try_acquire(&lock_path) {
        Ok(Some(lock)) => Some(lock),
        Ok(None) => {
            info!(lock = ?lock_path, "another procwarden instance is running; exiting");
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, lock = ?lock_path, "instance lock unavailable; continuing without it");
            None
        }
    };
    info!(target_name = spec.name(), settings = ?config.settings_path, "procwarden starting");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;
    rt.block_on(run(config, spec, once));
    Ok(())
}
