//! BMC Network Configuration Daemon
//!
//! Main entry point. Wires the kernel event source and the supervisor state
//! watcher into the registry and runs the single-threaded event loop.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-3: Content of Audit Records - Structured logging
//! - AU-12: Audit Record Generation - Log daemon lifecycle
//! - SC-7: Boundary Protection - Network interface management
//! - SI-4: System Monitoring - Real-time event processing

use anyhow::Context;
use netconfd::supervisor::NetworkdSupervisor;
use netconfd::{KernelEventSource, LldpEmitter, LoggingBus, Manager, NetworkEvent, Settings};
use std::path::Path;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Queue depth between the event sources and the registry
const EVENT_QUEUE_DEPTH: usize = 1024;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("netconfd: Starting network configuration daemon");

    let settings = Settings::load(Path::new(netconfd::config::DEFAULT_SETTINGS_PATH))
        .context("failed to load settings")?;

    match run_daemon(settings).await {
        Ok(()) => {
            info!("netconfd: Daemon exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "netconfd: Daemon exiting with error");
            Err(e)
        }
    }
}

/// Initialize structured logging
///
/// # NIST Controls
/// - AU-3: Content of Audit Records - Structured format
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();
}

/// Main daemon loop
///
/// The registry is the sole owner of all mutable state; kernel events,
/// supervisor state changes and the reload timer are multiplexed into it
/// from one task, so mutations never interleave.
async fn run_daemon(settings: Settings) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<NetworkEvent>(EVENT_QUEUE_DEPTH);

    // socket-level failures at construction are fatal
    let source = KernelEventSource::new().context("failed to open netlink socket")?;
    let netlink_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = source.run(netlink_tx).await {
            error!(error = %e, "Kernel event source terminated");
        }
    });

    let conn = zbus::Connection::system()
        .await
        .context("failed to connect to the system bus")?;
    conn.request_name(settings.bus_name.as_str())
        .await
        .with_context(|| format!("failed to request bus name {}", settings.bus_name))?;

    // a supervisor that is down right now is not fatal; its state converges
    // through the signal subscription once it returns
    let watcher_conn = conn.clone();
    let watcher_namespace = settings.supervisor_link_namespace.clone();
    let watcher_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = netconfd::supervisor::watch(watcher_conn, watcher_namespace, watcher_tx).await
        {
            warn!(error = %e, "Supervisor state watcher terminated");
        }
    });

    let supervisor = NetworkdSupervisor::new(&conn)
        .await
        .context("failed to create supervisor proxy")?;
    let lldp = LldpEmitter::new(settings.lldp_conf_path.clone(), Some(conn.clone()));
    let mut manager = Manager::new(settings, Box::new(LoggingBus), Box::new(supervisor))
        .with_lldp(lldp);

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    info!("netconfd: Entering event loop");
    loop {
        // the deadline is read outside the select so the timer arm does not
        // borrow the registry
        let deadline = manager.reload_deadline();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("netconfd: Received SIGTERM, shutting down");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                manager.handle_event(event);
                // drain whatever else this wakeup delivered before polling again
                while let Ok(event) = rx.try_recv() {
                    manager.handle_event(event);
                }
            }
            _ = sleep_until_or_forever(deadline) => {
                manager.fire_reload().await;
            }
        }
    }

    Ok(())
}

async fn sleep_until_or_forever(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_or_forever_pends_without_deadline() {
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(60),
            sleep_until_or_forever(None),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_or_forever_fires_at_deadline() {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(3);
        sleep_until_or_forever(Some(deadline)).await;
        assert!(tokio::time::Instant::now() >= deadline);
    }
}
