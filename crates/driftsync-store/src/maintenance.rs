//! Timer-driven store maintenance
//!
//! Runs compaction every `compact_interval` and transaction-history cleanup
//! keyed to `retention_days`. The task observes the engine's cancellation
//! token and exits cleanly on shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::store::StateStore;

/// Background maintenance task handle
pub struct MaintenanceTask {
    handle: JoinHandle<()>,
}

impl MaintenanceTask {
    /// Spawns the maintenance loop
    ///
    /// `compact_interval` is in hours; `retention_days` bounds the
    /// transaction history. Cleanup runs daily.
    pub fn spawn(
        store: Arc<StateStore>,
        compact_interval_hours: u64,
        retention_days: u32,
        token: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let compact_every = Duration::from_secs(compact_interval_hours.max(1) * 3600);
            let cleanup_every = Duration::from_secs(24 * 3600);

            let mut compact_timer = tokio::time::interval(compact_every);
            let mut cleanup_timer = tokio::time::interval(cleanup_every);
            // The first tick of an interval fires immediately; skip it so
            // maintenance does not run at startup.
            compact_timer.tick().await;
            cleanup_timer.tick().await;

            info!(
                compact_hours = compact_interval_hours,
                retention_days, "Store maintenance task started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Store maintenance task stopping");
                        break;
                    }
                    _ = compact_timer.tick() => {
                        if let Err(e) = store.compact().await {
                            error!(error = %e, "Scheduled compaction failed");
                        }
                    }
                    _ = cleanup_timer.tick() => {
                        let before = Utc::now() - chrono::Duration::days(retention_days as i64);
                        if let Err(e) = store.cleanup(before).await {
                            error!(error = %e, "Scheduled cleanup failed");
                        }
                    }
                }
            }
        });

        Self { handle }
    }

    /// Waits for the task to finish after cancellation
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
