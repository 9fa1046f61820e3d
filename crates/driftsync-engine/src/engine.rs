//! Sync engine lifecycle and orchestration
//!
//! ```text
//!                   start()
//!   Stopped ─────────────────────────▶ Running
//!       ▲                                │
//!       │                       pause() / resume()
//!       │ stop()                         ▼
//!       └──────────────────────────── Paused
//! ```
//!
//! `start` opens the watcher on the configured root and spawns the
//! change-event monitor and the periodic sync loop; both observe the
//! run's cancellation token. The change queue's processing callback runs
//! the pipeline, so a failed pipeline restores its batch to pending.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use driftsync_conflict::ConflictResolver;
use driftsync_core::config::Config;
use driftsync_core::domain::{ChangeEvent, ChangeKind, SyncState, SyncTransaction, TransactionKind};
use driftsync_core::error::CoreError;
use driftsync_core::ports::object_store::ObjectStore;
use driftsync_core::ports::strategy::{map_remote_path, SyncDirection, SyncResult, SyncStrategy};
use driftsync_core::domain::FileSyncStatus;
use driftsync_store::StateStore;
use driftsync_watch::{ChangeQueue, FileWatcher, IgnoreMatcher, ProcessFn, QueueConfig, WatcherConfig};

use crate::metrics::{MetricsSnapshot, SyncMetrics};
use crate::pipeline::{
    AnalyzePhase, CollectPhase, ExecutePhase, PipelineConfig, PipelineInput, SyncPipeline,
    VerifyPhase,
};

/// Observable engine events for collaborators
#[derive(Debug, Clone)]
pub enum EngineEvent {
    OperationStarted { operation: String },
    Progress { phase: String, completed: u64, total: u64 },
    OperationEnded { success: bool },
}

/// Snapshot of the engine's externally visible state
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    pub is_running: bool,
    pub is_paused: bool,
    pub current_operation: String,
    pub progress: f64,
    pub state: SyncState,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Default)]
struct Lifecycle {
    running: bool,
    paused: bool,
}

/// The sync engine
pub struct SyncEngine {
    config: Config,
    object_store: Arc<dyn ObjectStore>,
    strategy: Arc<dyn SyncStrategy>,
    state_store: Arc<StateStore>,
    resolver: Arc<ConflictResolver>,
    pipeline: SyncPipeline,

    lifecycle: RwLock<Lifecycle>,
    sync_state: Mutex<SyncState>,
    metrics: SyncMetrics,
    events_tx: broadcast::Sender<EngineEvent>,

    /// One pipeline run at a time
    sync_gate: Mutex<()>,

    token: StdMutex<Option<CancellationToken>>,
    watcher: Mutex<Option<Arc<FileWatcher>>>,
    queue: Mutex<Option<Arc<ChangeQueue>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Builds an engine around its four collaborators
    ///
    /// Loads any persisted sync state; a load failure is logged and a
    /// fresh state is used.
    pub async fn new(
        config: Config,
        object_store: Arc<dyn ObjectStore>,
        strategy: Arc<dyn SyncStrategy>,
        state_store: Arc<StateStore>,
    ) -> anyhow::Result<Arc<Self>> {
        let (events_tx, _) = broadcast::channel(256);

        let resolver = Arc::new(ConflictResolver::from_config(&config.conflicts));

        let pipeline_config = PipelineConfig {
            max_retries: config.sync.retry_attempts,
            retry_delay: Duration::from_secs(config.sync.retry_delay),
            timeout: Duration::from_secs(config.sync.timeout),
            enable_validation: true,
        };

        let source_root = config.sync.root.clone();
        let destination = config.sync.destination.clone();
        let verify_enabled = strategy.direction() != SyncDirection::Backup;

        let phases: Vec<Box<dyn crate::pipeline::PipelinePhase>> = vec![
            Box::new(CollectPhase::new(
                IgnoreMatcher::with_patterns(&config.files.ignore_patterns),
                config.files.max_file_size,
                events_tx.clone(),
            )),
            Box::new(AnalyzePhase::new(
                Arc::clone(&object_store),
                source_root.clone(),
                destination.clone(),
            )),
            Box::new(ExecutePhase::new(
                Arc::clone(&strategy),
                Arc::clone(&state_store),
                source_root.clone(),
                destination.clone(),
                events_tx.clone(),
            )),
            Box::new(VerifyPhase::new(
                Arc::clone(&object_store),
                source_root,
                destination,
                verify_enabled,
            )),
        ];

        let sync_state = match state_store.load_sync_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted sync state, starting fresh");
                SyncState::new()
            }
        };

        info!(
            strategy = strategy.name(),
            provider = object_store.name(),
            root = %config.sync.root.display(),
            "Sync engine created"
        );

        Ok(Arc::new(Self {
            config,
            object_store,
            strategy,
            state_store,
            resolver,
            pipeline: SyncPipeline::new(phases, pipeline_config),
            lifecycle: RwLock::new(Lifecycle::default()),
            sync_state: Mutex::new(sync_state),
            metrics: SyncMetrics::new(),
            events_tx,
            sync_gate: Mutex::new(()),
            token: StdMutex::new(None),
            watcher: Mutex::new(None),
            queue: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts the engine: watcher, queue, change monitor and periodic loop
    pub async fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        {
            let mut lifecycle = self.lifecycle.write().await;
            if lifecycle.running {
                return Err(CoreError::sync("engine already running"));
            }
            lifecycle.running = true;
            lifecycle.paused = false;
        }

        let token = CancellationToken::new();
        *self.token.lock().unwrap() = Some(token.clone());

        info!(
            strategy = self.strategy.name(),
            interval_secs = self.config.sync.interval,
            "Starting sync engine"
        );

        // Watcher
        let watcher_config = WatcherConfig {
            debounce: Duration::from_millis(self.config.sync.debounce_ms),
            hash_algorithm: self.config.files.hash_algorithm,
            ..Default::default()
        };
        let (watcher, mut event_rx, mut error_rx) = FileWatcher::new(watcher_config)
            .map_err(|e| CoreError::sync("failed to create file watcher").with_source(e))?;
        watcher.set_ignore_patterns(&self.config.files.ignore_patterns);

        let watcher = Arc::new(watcher);
        if let Err(e) = watcher.start(&[self.config.sync.root.clone()]).await {
            self.lifecycle.write().await.running = false;
            return Err(CoreError::sync("failed to start file watcher").with_source(e));
        }
        *self.watcher.lock().await = Some(Arc::clone(&watcher));

        // Change queue; its processor runs the pipeline, so a failed
        // pipeline restores the batch to pending
        let engine = Arc::downgrade(self);
        let process: ProcessFn = Arc::new(move |batch| {
            let engine = engine.clone();
            Box::pin(async move {
                let Some(engine) = engine.upgrade() else {
                    anyhow::bail!("engine dropped");
                };
                engine.process_batch(batch).await
            })
        });
        let queue_config = QueueConfig {
            max_size: self.config.performance.queue_size,
            batch_size: self.config.sync.batch_size,
            flush_interval: Duration::from_secs(self.config.sync.flush_interval),
        };
        let queue = ChangeQueue::new(Arc::clone(&self.state_store), queue_config, process)
            .await
            .map_err(|e| CoreError::database("failed to open change queue").with_source(e))?;
        queue.start();
        *self.queue.lock().await = Some(Arc::clone(&queue));

        // Change-event monitor
        let monitor = {
            let queue = Arc::clone(&queue);
            let token = token.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        event = event_rx.recv() => {
                            let Some(event) = event else { break };
                            debug!(path = %event.path.display(), kind = %event.kind, "Change event received");
                            if let Err(e) = queue.add(event).await {
                                warn!(error = %e, "Change queue rejected event");
                            }
                        }
                        err = error_rx.recv() => {
                            let Some(err) = err else { break };
                            error!(error = %err, "File watcher error");
                        }
                    }
                }
                debug!("Change monitor stopped");
            })
        };

        // Periodic sync loop
        let periodic = {
            let engine = Arc::downgrade(self);
            let token = token.clone();
            let interval = Duration::from_secs(self.config.sync.interval);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            let Some(engine) = engine.upgrade() else { break };
                            if engine.lifecycle.read().await.paused {
                                debug!("Periodic tick observed while paused, ignoring");
                                continue;
                            }
                            if let Err(e) = engine.sync().await {
                                error!(error = %e, "Scheduled sync failed");
                            }
                        }
                    }
                }
                debug!("Periodic sync loop stopped");
            })
        };
        self.tasks.lock().await.extend([monitor, periodic]);

        {
            let mut state = self.sync_state.lock().await;
            state.is_running = true;
            state.is_paused = false;
            state.provider = Some(self.object_store.name().to_string());
            state.strategy = Some(self.strategy.name().to_string());
        }
        self.persist_state().await;

        info!("Sync engine started");
        Ok(())
    }

    /// Stops the engine; idempotent
    pub async fn stop(&self) -> Result<(), CoreError> {
        {
            let mut lifecycle = self.lifecycle.write().await;
            if !lifecycle.running {
                return Ok(());
            }
            lifecycle.running = false;
            lifecycle.paused = false;
        }

        info!("Stopping sync engine");

        if let Some(token) = self.token.lock().unwrap().take() {
            token.cancel();
        }

        let watcher = self.watcher.lock().await.take();
        if let Some(watcher) = watcher {
            watcher.stop().await;
        }
        let queue = self.queue.lock().await.take();
        if let Some(queue) = queue {
            queue.stop().await;
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        {
            let mut state = self.sync_state.lock().await;
            state.is_running = false;
            state.is_paused = false;
            state.current_operation = String::new();
        }
        self.persist_state().await;

        info!("Sync engine stopped");
        Ok(())
    }

    /// Pauses the running engine
    pub async fn pause(&self) -> Result<(), CoreError> {
        {
            let mut lifecycle = self.lifecycle.write().await;
            if !lifecycle.running {
                return Err(CoreError::sync("engine not running"));
            }
            if lifecycle.paused {
                return Err(CoreError::sync("engine already paused"));
            }
            lifecycle.paused = true;
        }

        self.sync_state.lock().await.is_paused = true;
        self.persist_state().await;

        info!("Sync engine paused");
        Ok(())
    }

    /// Resumes a paused engine
    pub async fn resume(&self) -> Result<(), CoreError> {
        {
            let mut lifecycle = self.lifecycle.write().await;
            if !lifecycle.running {
                return Err(CoreError::sync("engine not running"));
            }
            if !lifecycle.paused {
                return Err(CoreError::sync("engine not paused"));
            }
            lifecycle.paused = false;
        }

        self.sync_state.lock().await.is_paused = false;
        self.persist_state().await;

        info!("Sync engine resumed");
        Ok(())
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// On-demand sync: drains the queue through the pipeline, then runs a
    /// full pass (which also performs mirror cleanup)
    pub async fn sync(&self) -> anyhow::Result<SyncResult> {
        if !self.lifecycle.read().await.running {
            return Err(CoreError::sync("engine not running").into());
        }

        let queue = self.queue.lock().await.clone();
        if let Some(queue) = queue {
            queue.flush().await;
        }

        self.execute_sync(Vec::new(), TransactionKind::FullSync).await
    }

    /// Queue processing callback: runs the pipeline over one batch
    ///
    /// An error return makes the queue restore the batch to pending.
    async fn process_batch(&self, batch: Vec<ChangeEvent>) -> anyhow::Result<()> {
        if self.lifecycle.read().await.paused {
            anyhow::bail!("engine is paused");
        }

        let result = self
            .execute_sync(batch, TransactionKind::PartialSync)
            .await?;
        if !result.success {
            debug!(
                errors = result.errors.len(),
                conflicts = result.conflicts.len(),
                "Batch completed with per-file failures or conflicts"
            );
        }
        Ok(())
    }

    /// One pipeline execution wrapped in a persisted transaction
    async fn execute_sync(
        &self,
        changes: Vec<ChangeEvent>,
        kind: TransactionKind,
    ) -> anyhow::Result<SyncResult> {
        let _gate = self.sync_gate.lock().await;

        let token = self
            .token
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default();

        let mut transaction = SyncTransaction::begin(kind);
        transaction.files_affected = changes
            .iter()
            .map(|c| c.path.to_string_lossy().into_owned())
            .collect();
        self.state_store.save_transaction(&transaction).await?;

        let _ = self.events_tx.send(EngineEvent::OperationStarted {
            operation: kind.as_str().to_string(),
        });
        {
            let mut state = self.sync_state.lock().await;
            state.start_operation(kind.as_str());
        }
        self.persist_state().await;

        self.metrics
            .set_current(changes.len() as u64, changes.iter().map(|c| c.size).sum());

        let local_paths = self.local_path_set(&changes).await?;
        let input = PipelineInput {
            transaction_id: transaction.id.clone(),
            changes,
            local_paths,
            file_states: Default::default(),
            metadata: Default::default(),
        };

        match self.pipeline.execute(input, &token).await {
            Ok(mut result) => {
                self.record_resolutions(&mut result).await;

                self.metrics.record_success(&result);
                transaction.complete(result.clone());
                if let Err(e) = self.state_store.save_transaction(&transaction).await {
                    error!(error = %e, "Failed to persist completed transaction");
                }

                self.finish_state(true).await;
                let _ = self
                    .events_tx
                    .send(EngineEvent::OperationEnded { success: true });

                Ok(result)
            }
            Err(e) => {
                self.metrics.record_failure();
                transaction.fail(format!("{e:#}"));
                if let Err(save_err) = self.state_store.save_transaction(&transaction).await {
                    error!(error = %save_err, "Failed to persist failed transaction");
                }

                {
                    let mut state = self.sync_state.lock().await;
                    state.add_error(format!("{e:#}"));
                }
                self.finish_state(false).await;
                let _ = self
                    .events_tx
                    .send(EngineEvent::OperationEnded { success: false });

                Err(e)
            }
        }
    }

    /// Consults the resolver for every conflict surfaced by the pipeline
    /// and persists the resolved conflict records
    async fn record_resolutions(&self, result: &mut SyncResult) {
        if result.conflicts.is_empty() {
            return;
        }

        let resolutions = self.resolver.resolve_many(&result.conflicts);
        for (conflict_id, resolution) in resolutions {
            let Some(conflict) = result.conflicts.iter_mut().find(|c| c.id == conflict_id) else {
                continue;
            };
            conflict.mark_attempted();
            conflict.add_history(format!("resolved with {}", resolution.strategy));
            conflict.set_resolution(resolution);
            if let Err(e) = self.state_store.save_conflict(conflict).await {
                error!(path = %conflict.path, error = %e, "Failed to persist conflict record");
            }
        }
    }

    /// Ends the current operation on the persisted state and refreshes
    /// the aggregate counters
    async fn finish_state(&self, success: bool) {
        let stats = self.state_store.statistics().await.ok();

        {
            let mut state = self.sync_state.lock().await;
            state.end_operation(success);
            if let Some(stats) = stats {
                state.total_files = stats.total_files;
                state.synced_files = stats.total_synced;
                state.pending_files = stats.total_pending;
                state.failed_files = stats.total_error;
                state.total_bytes = stats.total_bytes;
                state.synced_bytes = stats.synced_bytes;
            }
        }
        self.persist_state().await;
    }

    /// Builds the authoritative set of remote paths present locally:
    /// every live file state plus this batch's additions, minus its
    /// deletions
    async fn local_path_set(&self, changes: &[ChangeEvent]) -> anyhow::Result<BTreeSet<String>> {
        let root = &self.config.sync.root;
        let destination = &self.config.sync.destination;

        let mut set = BTreeSet::new();
        for state in self.state_store.list_file_states().await? {
            if state.status == FileSyncStatus::Deleted || state.is_directory {
                continue;
            }
            set.insert(map_remote_path(root, destination, Path::new(&state.path)));
        }

        for change in changes {
            let remote = map_remote_path(root, destination, &change.path);
            match change.kind {
                ChangeKind::Delete => {
                    set.remove(&remote);
                }
                ChangeKind::Rename | ChangeKind::Move => {
                    if let Some(old) = &change.old_path {
                        set.remove(&map_remote_path(root, destination, old));
                    }
                    if !change.is_directory {
                        set.insert(remote);
                    }
                }
                _ if !change.is_directory => {
                    set.insert(remote);
                }
                _ => {}
            }
        }

        Ok(set)
    }

    async fn persist_state(&self) {
        let state = self.sync_state.lock().await.clone();
        if let Err(e) = self.state_store.save_sync_state(&state).await {
            error!(error = %e, "Failed to persist sync state");
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Current engine status with metrics
    pub async fn status(&self) -> EngineStatus {
        let lifecycle = self.lifecycle.read().await;
        let state = self.sync_state.lock().await.clone();

        EngineStatus {
            is_running: lifecycle.running,
            is_paused: lifecycle.paused,
            current_operation: state.current_operation.clone(),
            progress: state.operation_progress,
            state,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Subscribes to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn state_store(&self) -> &Arc<StateStore> {
        &self.state_store
    }
}
