//! `driftsync sync` - run a single synchronization cycle

use anyhow::Result;
use clap::Args;

use driftsync_core::config::Config;

use crate::setup;

#[derive(Debug, Args)]
pub struct SyncCommand {}

impl SyncCommand {
    pub async fn run(&self, config: &Config, json: bool) -> Result<()> {
        let engine = setup::build_engine(config).await?;

        engine.start().await?;
        let outcome = engine.sync().await;
        engine.stop().await?;

        let result = outcome?;

        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            println!(
                "processed {} files: {} uploaded, {} deleted, {} skipped ({} bytes)",
                result.files_processed,
                result.files_uploaded,
                result.files_deleted,
                result.files_skipped,
                result.bytes_transferred,
            );
            if !result.conflicts.is_empty() {
                println!("conflicts: {}", result.conflicts.len());
            }
            for error in &result.errors {
                println!("failed {} ({}): {}", error.path, error.operation, error.message);
            }
        }

        if !result.success {
            anyhow::bail!("sync finished with errors or unresolved conflicts");
        }
        Ok(())
    }
}
