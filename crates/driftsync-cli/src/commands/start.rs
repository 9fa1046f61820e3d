//! `driftsync start` - run the engine in the foreground
//!
//! Starts the engine with the store maintenance task and blocks until
//! SIGINT, then shuts everything down cleanly.

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use driftsync_core::config::Config;
use driftsync_store::MaintenanceTask;

use crate::setup;

#[derive(Debug, Args)]
pub struct StartCommand {}

impl StartCommand {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let engine = setup::build_engine(config).await?;

        let maintenance_token = CancellationToken::new();
        let maintenance = MaintenanceTask::spawn(
            engine.state_store().clone(),
            config.database.compact_interval,
            config.database.retention_days,
            maintenance_token.clone(),
        );

        engine.start().await?;
        info!(root = %config.sync.root.display(), "driftsync running, press Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        engine.stop().await?;
        maintenance_token.cancel();
        maintenance.join().await;
        engine.state_store().close().await;

        Ok(())
    }
}
