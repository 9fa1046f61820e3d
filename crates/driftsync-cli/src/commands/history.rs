//! `driftsync history` - list recent sync transactions

use anyhow::Result;
use clap::Args;

use driftsync_core::config::Config;

use crate::setup;

#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Maximum number of transactions to show
    #[arg(long, default_value_t = 20)]
    limit: u64,

    /// Skip the newest N transactions
    #[arg(long, default_value_t = 0)]
    offset: u64,
}

impl HistoryCommand {
    pub async fn run(&self, config: &Config, json: bool) -> Result<()> {
        setup::ensure_valid(config)?;
        let store = setup::open_state_store(config).await?;

        let transactions = store.list_transactions(self.offset, self.limit).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&transactions)?);
        } else if transactions.is_empty() {
            println!("no transactions recorded");
        } else {
            for txn in &transactions {
                let duration = txn
                    .duration()
                    .map(|d| format!("{}s", d.num_seconds()))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:12}  {:9?}  {:>6}  {} bytes",
                    txn.start_time.format("%Y-%m-%d %H:%M:%S"),
                    txn.kind.as_str(),
                    txn.status,
                    duration,
                    txn.bytes_transferred,
                );
                for error in &txn.errors {
                    println!("    error: {error}");
                }
            }
        }

        store.close().await;
        Ok(())
    }
}
