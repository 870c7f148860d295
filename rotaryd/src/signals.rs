//! Termination/reload signal handling. SIGINT and SIGTERM both request a
//! graceful shutdown; SIGHUP requests a configuration re-read. Built on
//! `signal-hook`/`signal-hook-tokio` rather than `tokio::signal` so the same
//! listener task covers all three signals uniformly.

use anyhow::Context;
use futures::stream::StreamExt;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Shutdown,
    Reload,
}

/// Spawn the signal-listening task and return the channel it forwards
/// mapped signals on. The task ends (closing the channel) once the signal
/// stream itself ends, which only happens at process exit.
pub fn spawn_listener() -> anyhow::Result<mpsc::Receiver<ControlSignal>> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP]).context("failed to install signal handlers")?;
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            let mapped = match signal {
                SIGINT | SIGTERM => {
                    info!(signal, "received termination signal");
                    ControlSignal::Shutdown
                }
                SIGHUP => {
                    info!("received SIGHUP, requesting configuration re-read");
                    ControlSignal::Reload
                }
                _ => continue,
            };
            if tx.send(mapped).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
