//! # Refresh Task
//!
//! The external scheduler that polls the engine. The engine itself never
//! retries; this task calls [`refresh_once`] on a fixed interval and keeps
//! going after failures.
//!
//! ```text
//! tick ──► check_update() ──► changes? ── no ──► wait for next tick
//!                                 │
//!                                 yes
//!                                 ▼
//!                          update(names) ──► hub notifies subscribers
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use qconfig_core::ConfigItem;

use crate::engine::SyncEngine;
use crate::error::{QConfigError, QConfigResult};

/// Runs one poll: check every known item, then update those that changed.
///
/// Returns the applied items; empty when nothing changed. Subscribers are
/// notified by the update itself.
pub async fn refresh_once(engine: &SyncEngine) -> QConfigResult<Vec<ConfigItem>> {
    let changes = engine.check_update(Vec::new()).await?;
    if changes.is_empty() {
        debug!("Refresh found no changes");
        return Ok(Vec::new());
    }

    let names: Vec<String> = changes.into_iter().map(|c| c.name).collect();
    engine.update(&names).await
}

/// Periodic poller for a [`SyncEngine`].
pub struct RefreshTask {
    engine: Arc<SyncEngine>,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running [`RefreshTask`]. Dropping it also stops
/// the task.
pub struct RefreshHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stops the task and waits for the current poll to finish.
    pub async fn shutdown(self) -> QConfigResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| QConfigError::InvalidState("Refresh task already stopped".into()))?;
        self.join
            .await
            .map_err(|e| QConfigError::InvalidState(format!("Refresh task panicked: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl RefreshTask {
    /// Spawns the poller. The first poll happens one `interval` from now,
    /// since `init` has just reconciled.
    pub fn spawn(engine: Arc<SyncEngine>, interval: Duration) -> RefreshHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = RefreshTask {
            engine,
            interval,
            shutdown_rx,
        };
        let join = tokio::spawn(task.run());
        RefreshHandle { shutdown_tx, join }
    }

    async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Refresh task starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match refresh_once(&self.engine).await {
                        Ok(items) if !items.is_empty() => {
                            info!(count = items.len(), "Refresh applied config changes");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, retryable = e.is_retryable(), "Config refresh failed");
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Refresh task shutting down");
                    break;
                }
            }
        }

        info!("Refresh task stopped");
    }
}
