//! Shared construction helpers for commands that need a live engine
//!
//! Configuration is validated before any store or provider is built, so
//! invalid configuration exits without touching the remote.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use driftsync_core::config::Config;
use driftsync_core::domain::ResolutionStrategy;
use driftsync_core::ports::memory::MemoryStore;
use driftsync_core::ports::object_store::ObjectStore;
use driftsync_core::ports::strategy::{StrategyConfig, SyncStrategy};
use driftsync_engine::SyncEngine;
use driftsync_store::StateStore;
use driftsync_strategy::{BackupStrategy, MirrorStrategy, OneWayStrategy};

/// Validates the configuration, reporting every problem found
pub fn ensure_valid(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    for error in &errors {
        eprintln!("config error: {error}");
    }
    bail!("configuration is invalid ({} errors)", errors.len());
}

/// Builds the configured object store
///
/// Providers are looked up by name under `providers.<name>`. The built-in
/// `memory` provider needs no credentials; real providers plug in through
/// the same port.
pub fn build_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    let name = config
        .providers
        .keys()
        .next()
        .map(String::as_str)
        .unwrap_or("memory");

    match name {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => bail!("provider '{other}' is not available in this build"),
    }
}

/// Builds the configured sync strategy over an object store
pub fn build_strategy(
    config: &Config,
    store: Arc<dyn ObjectStore>,
) -> Result<Arc<dyn SyncStrategy>> {
    let strategy_config = StrategyConfig {
        conflict_resolution: ResolutionStrategy::parse(&config.sync.conflict_resolution)
            .unwrap_or(ResolutionStrategy::KeepLocal),
        max_file_size: config.files.max_file_size,
        preserve_deleted: false,
        version_control: false,
    };

    let strategy: Arc<dyn SyncStrategy> = match config.sync.strategy.as_str() {
        "one_way" => Arc::new(OneWayStrategy::new(store, Some(strategy_config))),
        "mirror" => Arc::new(MirrorStrategy::new(store, Some(strategy_config))),
        "backup" => Arc::new(BackupStrategy::new(store, Some(strategy_config))),
        other => bail!("unknown sync strategy '{other}'"),
    };
    Ok(strategy)
}

/// Opens the state store at the configured path
pub async fn open_state_store(config: &Config) -> Result<Arc<StateStore>> {
    let store = StateStore::open(&config.database.path)
        .await
        .with_context(|| {
            format!(
                "failed to open state store at {}",
                config.database.path.display()
            )
        })?;
    Ok(Arc::new(store))
}

/// Validates configuration and assembles a ready-to-start engine
pub async fn build_engine(config: &Config) -> Result<Arc<SyncEngine>> {
    ensure_valid(config)?;

    let object_store = build_object_store(config)?;
    let strategy = build_strategy(config, Arc::clone(&object_store))?;
    let state_store = open_state_store(config).await?;

    SyncEngine::new(config.clone(), object_store, strategy, state_store).await
}
