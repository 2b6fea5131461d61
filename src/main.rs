//! qguardd: daemon guarding against accidental Cmd+Q on macOS
//!
//! The daemon intercepts the quit shortcut system-wide before it reaches
//! the foreground application. When the shortcut is actually bound to a
//! menu command in that application, the press is swallowed and a
//! confirmation HUD is raised; only five presses in one held sequence let
//! the quit through. Quick taps are counted as prevented accidents.
//!
//! Structure:
//! - Event taps and the press-counting machine run on a dedicated thread
//! - Guard events cross to the tokio runtime over a broadcast channel
//! - The HUD overlay and menu-bar companion attach over a Unix socket

mod config;
mod events;
mod guard;
mod hud;
mod ipc;
mod lifecycle;
mod menu;
mod stats;
mod tap;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::GuardEvent;
use crate::guard::GuardDriver;
use crate::hud::{Hud, NotifyHud};
use crate::ipc::{Notification, Server};
use crate::stats::{FileLedger, QuitLedger};
use crate::tap::TapListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "qguardd starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, combination = ?config.combination, "configuration loaded");

    // Channels: guard machine -> driver, driver/server -> subscribed clients
    let (guard_tx, guard_rx) = broadcast::channel::<GuardEvent>(64);
    let (notify_tx, _) = broadcast::channel::<Notification>(64);

    // Collaborators behind the guard
    let ledger: Arc<dyn QuitLedger> =
        Arc::new(FileLedger::load(&config.stats_path).context("failed to load quit ledger")?);
    let hud: Arc<dyn Hud> = Arc::new(NotifyHud::new(notify_tx.clone()));

    // Install the quit taps. Without them the daemon is inert, so a denied
    // tap is fatal rather than degraded.
    let listener = TapListener::new(config.combination, config.press_threshold, guard_tx.clone());
    if let Err(e) = listener.start() {
        error!(?e, "failed to install quit event taps");
        return Err(e).context(
            "quit guard cannot run without its event taps; grant Input Monitoring / \
             Accessibility permission and restart",
        );
    }
    info!("quit guard active");

    // IPC server for the overlay and menu-bar companions
    let server = Server::new(&config.socket_path, Arc::clone(&ledger), notify_tx.clone())?;
    server.set_guarding(true).await;

    let driver = GuardDriver::new(hud, ledger, notify_tx, config.hud_linger);

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Apply guard events to the HUD and the ledger
        _ = driver.run(guard_rx) => {
            info!("guard driver exited");
        }

        // Accept companion connections
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        _ = lifecycle::wait_for_shutdown() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    listener.stop();
    server.shutdown().await;

    info!("qguardd stopped");

    Ok(())
}
