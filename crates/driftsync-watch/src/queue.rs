//! Change queue
//!
//! Accepts possibly-repeated events from the watcher, collapses them per
//! path, persists the pending set and hands time-bounded batches to a
//! processing callback.
//!
//! Deduplication (existing `old` vs incoming `new` on the same path):
//!
//! | old      | new    | outcome |
//! |----------|--------|---------|
//! | Create   | Delete | both removed from the queue |
//! | any      | Delete | Delete wins |
//! | Create   | Modify | still a Create, with the new content facts |
//! | Modify   | Modify | newer timestamp wins |
//! | other    | other  | newer timestamp wins |
//!
//! Durability: the full pending set is mirrored to the `queue` bucket
//! after every add and every flush. The mirror write happens inside the
//! pending-lock critical section so mirrors serialize in mutation order.
//! On startup the pending set is loaded before any new event is accepted.
//!
//! Lock order: pending first, processing second. Never the reverse.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use driftsync_core::domain::{ChangeEvent, ChangeKind};
use driftsync_core::error::CoreError;
use driftsync_store::StateStore;

/// Batch processing callback
pub type ProcessFn =
    Arc<dyn Fn(Vec<ChangeEvent>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum pending entries before `add` is rejected
    pub max_size: usize,
    /// Entries handed to the callback per flush
    pub batch_size: usize,
    /// Time between flushes
    pub flush_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Point-in-time queue statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub max_size: usize,
    pub batch_size: usize,
    pub flush_interval_secs: u64,
    pub kind_counts: HashMap<String, usize>,
}

/// Deduplicating, persistent change queue
pub struct ChangeQueue {
    store: Arc<StateStore>,
    pending: Mutex<HashMap<PathBuf, ChangeEvent>>,
    processing: Mutex<HashSet<PathBuf>>,
    config: QueueConfig,
    process: ProcessFn,
    token: CancellationToken,
    worker: StdMutex<Option<JoinHandle<()>>>,
}

impl ChangeQueue {
    /// Creates a queue, loading the persisted pending set before any new
    /// event is accepted
    pub async fn new(
        store: Arc<StateStore>,
        config: QueueConfig,
        process: ProcessFn,
    ) -> anyhow::Result<Arc<Self>> {
        let persisted = store.load_queue().await?;
        let mut pending = HashMap::with_capacity(persisted.len());
        for event in persisted {
            pending.insert(event.path.clone(), event);
        }

        if !pending.is_empty() {
            info!(restored = pending.len(), "Restored pending changes from state store");
        }

        Ok(Arc::new(Self {
            store,
            pending: Mutex::new(pending),
            processing: Mutex::new(HashSet::new()),
            config,
            process,
            token: CancellationToken::new(),
            worker: StdMutex::new(None),
        }))
    }

    /// Starts the flush scheduler
    pub fn start(self: &Arc<Self>) {
        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.config.flush_interval);
            // The first interval tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = queue.token.cancelled() => {
                        // Final flush drains what it can before shutdown
                        queue.flush().await;
                        break;
                    }
                    _ = ticker.tick() => {
                        queue.flush().await;
                    }
                }
            }
            info!("Change queue processor stopped");
        });
        *self.worker.lock().unwrap() = Some(handle);

        info!(
            max_size = self.config.max_size,
            batch_size = self.config.batch_size,
            flush_interval_secs = self.config.flush_interval.as_secs(),
            "Change queue started"
        );
    }

    /// Stops the scheduler after a final flush
    pub async fn stop(&self) {
        self.token.cancel();
        let worker = self.worker.lock().unwrap().take();
        if let Some(handle) = worker {
            let _ = handle.await;
        }
        info!("Change queue stopped");
    }

    /// Adds an event, deduplicating against the pending entry for its path
    ///
    /// Fails once the queue holds `max_size` entries. Events for paths
    /// currently being processed are silently skipped.
    pub async fn add(&self, event: ChangeEvent) -> Result<(), CoreError> {
        let mut pending = self.pending.lock().await;

        if pending.len() >= self.config.max_size {
            return Err(CoreError::sync(format!(
                "change queue is at capacity ({} entries)",
                self.config.max_size
            ))
            .with_context("path", event.path.to_string_lossy()));
        }

        {
            let processing = self.processing.lock().await;
            if processing.contains(&event.path) {
                debug!(path = %event.path.display(), "Skipping event for path being processed");
                return Ok(());
            }
        }

        let path = event.path.clone();
        match pending.remove(&path) {
            None => {
                debug!(path = %path.display(), kind = %event.kind, "Queued new event");
                pending.insert(path, event);
            }
            Some(existing) => match dedupe(existing, event) {
                Some(survivor) => {
                    debug!(path = %path.display(), kind = %survivor.kind, "Coalesced event");
                    pending.insert(path, survivor);
                }
                None => {
                    debug!(path = %path.display(), "Create/delete pair cancelled out");
                }
            },
        }

        self.mirror(&pending).await;
        Ok(())
    }

    /// Moves up to `batch_size` entries into processing and invokes the
    /// callback; a failed batch is restored into pending
    pub async fn flush(&self) {
        let batch: Vec<ChangeEvent> = {
            let mut pending = self.pending.lock().await;
            if pending.is_empty() {
                return;
            }

            let keys: Vec<PathBuf> = pending
                .keys()
                .take(self.config.batch_size)
                .cloned()
                .collect();

            let mut taken = Vec::with_capacity(keys.len());
            {
                let mut processing = self.processing.lock().await;
                for key in &keys {
                    if let Some(event) = pending.remove(key) {
                        processing.insert(key.clone());
                        taken.push(event);
                    }
                }
            }

            self.mirror(&pending).await;
            taken
        };

        if batch.is_empty() {
            return;
        }

        info!(batch = batch.len(), "Processing change batch");
        let result = (self.process)(batch.clone()).await;

        match result {
            Ok(()) => {
                let mut processing = self.processing.lock().await;
                for event in &batch {
                    processing.remove(&event.path);
                }
            }
            Err(e) => {
                error!(error = %e, batch = batch.len(), "Batch processing failed, restoring to pending");
                let mut pending = self.pending.lock().await;
                {
                    let mut processing = self.processing.lock().await;
                    for event in batch {
                        processing.remove(&event.path);
                        restore(&mut pending, event);
                    }
                }
                self.mirror(&pending).await;
            }
        }
    }

    /// Removes all pending entries
    pub async fn clear(&self) {
        let mut pending = self.pending.lock().await;
        pending.clear();
        self.mirror(&pending).await;
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn processing_count(&self) -> usize {
        self.processing.lock().await.len()
    }

    /// Statistics snapshot, including per-kind counts
    pub async fn stats(&self) -> QueueStats {
        let pending = self.pending.lock().await;
        let processing = self.processing.lock().await;

        let mut kind_counts: HashMap<String, usize> = HashMap::new();
        for event in pending.values() {
            *kind_counts.entry(event.kind.as_str().to_string()).or_default() += 1;
        }

        QueueStats {
            pending: pending.len(),
            processing: processing.len(),
            max_size: self.config.max_size,
            batch_size: self.config.batch_size,
            flush_interval_secs: self.config.flush_interval.as_secs(),
            kind_counts,
        }
    }

    /// Mirrors the pending set to the `queue` bucket. Called with the
    /// pending lock held so mirror writes serialize in mutation order.
    async fn mirror(&self, pending: &HashMap<PathBuf, ChangeEvent>) {
        let snapshot: Vec<ChangeEvent> = pending.values().cloned().collect();
        if let Err(e) = self.store.replace_queue(&snapshot).await {
            error!(error = %e, "Failed to mirror change queue to state store");
        }
    }
}

/// Applies the deduplication table; `None` means both events are dropped
fn dedupe(old: ChangeEvent, new: ChangeEvent) -> Option<ChangeEvent> {
    if new.kind == ChangeKind::Delete {
        if old.kind == ChangeKind::Create {
            // The file never reached the remote; nothing to do on either
            // side
            return None;
        }
        return Some(new);
    }

    if old.kind == ChangeKind::Create && new.kind == ChangeKind::Modify {
        // Still a Create, but carrying the latest content facts
        let mut merged = old;
        merged.hash = new.hash;
        merged.size = new.size;
        merged.timestamp = new.timestamp;
        merged.is_directory = new.is_directory;
        return Some(merged);
    }

    if new.timestamp > old.timestamp {
        Some(new)
    } else {
        Some(old)
    }
}

/// Reinserts a failed event, replaying the dedup rules against any event
/// admitted for the same path while the batch was processing
fn restore(pending: &mut HashMap<PathBuf, ChangeEvent>, failed: ChangeEvent) {
    let path = failed.path.clone();
    match pending.remove(&path) {
        None => {
            pending.insert(path, failed);
        }
        Some(newer) => {
            // The failed event is the older of the two
            if let Some(survivor) = dedupe(failed, newer) {
                pending.insert(path, survivor);
            }
        }
    }
}
