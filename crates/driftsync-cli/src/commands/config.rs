//! `driftsync config` - inspect and validate configuration

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use driftsync_core::config::Config;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Validate the configuration and report problems
    Validate,
    /// Print the default configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn run(&self, config: &Config, config_path: Option<&Path>, json: bool) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                if json {
                    println!("{}", serde_json::to_string_pretty(config)?);
                } else {
                    print!("{}", serde_yaml::to_string(config)?);
                }
                Ok(())
            }
            ConfigCommand::Validate => {
                let errors = config.validate();
                if errors.is_empty() {
                    println!("configuration is valid");
                    Ok(())
                } else {
                    for error in &errors {
                        eprintln!("config error: {error}");
                    }
                    anyhow::bail!("configuration is invalid ({} errors)", errors.len());
                }
            }
            ConfigCommand::Path => {
                let path = config_path
                    .map(Path::to_path_buf)
                    .unwrap_or_else(Config::default_path);
                println!("{}", path.display());
                Ok(())
            }
        }
    }
}
