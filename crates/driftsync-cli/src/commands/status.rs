//! `driftsync status` - show persisted sync state and statistics

use anyhow::Result;
use clap::Args;

use driftsync_core::config::Config;

use crate::setup;

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn run(&self, config: &Config, json: bool) -> Result<()> {
        setup::ensure_valid(config)?;
        let store = setup::open_state_store(config).await?;

        let state = store.load_sync_state().await?;
        let stats = store.statistics().await?;

        if json {
            let view = serde_json::json!({
                "state": state,
                "statistics": stats,
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        } else {
            let running = if state.is_running {
                if state.is_paused {
                    "paused"
                } else {
                    "running"
                }
            } else {
                "stopped"
            };
            println!("engine:        {running}");
            if !state.current_operation.is_empty() {
                println!(
                    "operation:     {} ({:.0}%)",
                    state.current_operation, state.operation_progress
                );
            }
            match state.last_sync_time {
                Some(t) => println!("last sync:     {}", t.to_rfc3339()),
                None => println!("last sync:     never"),
            }
            match state.last_success_time {
                Some(t) => println!("last success:  {}", t.to_rfc3339()),
                None => println!("last success:  never"),
            }
            println!(
                "files:         {} total, {} synced, {} pending, {} failed",
                stats.total_files, stats.total_synced, stats.total_pending, stats.total_error
            );
            println!(
                "bytes:         {} total, {} synced",
                stats.total_bytes, stats.synced_bytes
            );
            if let Some(error) = &state.last_error {
                println!("last error:    {error}");
            }
        }

        store.close().await;
        Ok(())
    }
}
