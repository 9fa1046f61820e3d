//! Four-phase sync pipeline: collect, analyze, execute, verify
//!
//! Each phase is a trait object constructed with exactly the collaborators
//! it needs (no back-pointer to the engine). Phase input is validated when
//! enabled; failures are retried per phase up to `max_retries` with
//! `retry_delay` between attempts; the whole pipeline runs under one
//! timeout.
//!
//! Between phases the metadata map is carried forward, and file states
//! produced by a phase feed the next phase's file-state map.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use driftsync_core::domain::{
    ChangeEvent, ChangeKind, Conflict, ConflictFile, ConflictKind, FileState, FileSyncStatus,
};
use driftsync_core::error::CoreError;
use driftsync_core::ports::object_store::ObjectStore;
use driftsync_core::ports::strategy::{map_remote_path, SyncRequest, SyncResult, SyncStrategy};
use driftsync_store::StateStore;
use driftsync_watch::IgnoreMatcher;

use crate::engine::EngineEvent;

/// Pipeline behavior knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-phase retry attempts
    pub max_retries: u32,
    /// Delay between phase retries
    pub retry_delay: Duration,
    /// Deadline for the whole pipeline
    pub timeout: Duration,
    /// Validate phase input before executing
    pub enable_validation: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
            enable_validation: true,
        }
    }
}

/// Input threaded through the pipeline phases
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub transaction_id: String,
    /// Deduplicated change events for this run
    pub changes: Vec<ChangeEvent>,
    /// Authoritative remote paths present locally (for mirror cleanup)
    pub local_paths: BTreeSet<String>,
    /// Per-path file states accumulated across phases
    pub file_states: HashMap<String, FileState>,
    pub metadata: HashMap<String, String>,
}

/// Output of one pipeline phase
#[derive(Debug, Default)]
pub struct PipelineOutput {
    /// File states to merge into the input map
    pub file_states: Vec<FileState>,
    /// Paths dropped by this phase (over the size limit)
    pub failed_files: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub bytes_transferred: u64,
    pub metadata: HashMap<String, String>,
    /// Narrowed change set for downstream phases, when this phase filters
    pub changes: Option<Vec<ChangeEvent>>,
    /// The strategy result, set by the execute phase
    pub result: Option<SyncResult>,
}

/// A single pipeline phase
#[async_trait::async_trait]
pub trait PipelinePhase: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validates phase input; called when validation is enabled
    fn validate(&self, input: &PipelineInput) -> Result<(), CoreError>;

    async fn execute(&self, input: &PipelineInput) -> Result<PipelineOutput>;
}

/// The ordered phase runner
pub struct SyncPipeline {
    phases: Vec<Box<dyn PipelinePhase>>,
    config: PipelineConfig,
}

impl SyncPipeline {
    pub fn new(phases: Vec<Box<dyn PipelinePhase>>, config: PipelineConfig) -> Self {
        Self { phases, config }
    }

    /// Runs every phase in order under the configured deadline
    pub async fn execute(
        &self,
        input: PipelineInput,
        token: &CancellationToken,
    ) -> Result<SyncResult> {
        match tokio::time::timeout(self.config.timeout, self.run(input, token)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::sync("pipeline timed out")
                .with_context("timeout_secs", self.config.timeout.as_secs().to_string())
                .into()),
        }
    }

    async fn run(&self, mut input: PipelineInput, token: &CancellationToken) -> Result<SyncResult> {
        let started = Utc::now();
        let mut conflicts: Vec<Conflict> = Vec::new();
        let mut failed_files: Vec<String> = Vec::new();
        let mut bytes_transferred = 0u64;
        let mut strategy_result: Option<SyncResult> = None;

        info!(
            transaction_id = %input.transaction_id,
            changes = input.changes.len(),
            "Starting sync pipeline"
        );

        for phase in &self.phases {
            if token.is_cancelled() {
                return Err(CoreError::sync("pipeline cancelled")
                    .with_context("phase", phase.name())
                    .into());
            }

            if self.config.enable_validation {
                phase.validate(&input).map_err(|e| {
                    CoreError::validation(format!(
                        "validation failed for phase {}: {}",
                        phase.name(),
                        e.message
                    ))
                })?;
            }

            debug!(phase = phase.name(), "Executing pipeline phase");
            let output = self.run_phase_with_retries(phase.as_ref(), &input, token).await?;

            // Carry phase results forward
            input.metadata = output.metadata;
            for state in output.file_states {
                input.file_states.insert(state.path.clone(), state);
            }
            if let Some(changes) = output.changes {
                input.changes = changes;
            }
            conflicts.extend(output.conflicts);
            failed_files.extend(output.failed_files);
            bytes_transferred += output.bytes_transferred;
            if let Some(result) = output.result {
                strategy_result = Some(result);
            }
        }

        let mut result = strategy_result.unwrap_or_else(SyncResult::started);
        result.start_time = started;
        result.conflicts.extend(conflicts);
        result.files_skipped += failed_files.len() as u64;
        result.bytes_transferred = bytes_transferred.max(result.bytes_transferred);
        result.finish();

        info!(
            transaction_id = %input.transaction_id,
            processed = result.files_processed,
            bytes = result.bytes_transferred,
            conflicts = result.conflicts.len(),
            success = result.success,
            "Sync pipeline completed"
        );

        Ok(result)
    }

    async fn run_phase_with_retries(
        &self,
        phase: &dyn PipelinePhase,
        input: &PipelineInput,
        token: &CancellationToken,
    ) -> Result<PipelineOutput> {
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=self.config.max_retries {
            match phase.execute(input).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    if attempt < self.config.max_retries {
                        warn!(
                            phase = phase.name(),
                            attempt = attempt + 1,
                            error = %e,
                            "Phase execution failed, retrying"
                        );
                        tokio::select! {
                            _ = token.cancelled() => {
                                return Err(CoreError::sync("pipeline cancelled")
                                    .with_context("phase", phase.name())
                                    .into());
                            }
                            _ = tokio::time::sleep(self.config.retry_delay) => {}
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        let mut error = CoreError::sync(format!(
            "phase {} failed after {} retries",
            phase.name(),
            self.config.max_retries
        ))
        .with_context("phase", phase.name());
        if let Some(cause) = last_error {
            error = error.with_source(cause);
        }
        Err(error.into())
    }
}

// ============================================================================
// Collect phase
// ============================================================================

/// Builds the candidate set from the run's change events, dropping ignored
/// paths and files over the size limit
pub struct CollectPhase {
    ignore: IgnoreMatcher,
    max_file_size: u64,
    events: broadcast::Sender<EngineEvent>,
}

impl CollectPhase {
    pub fn new(
        ignore: IgnoreMatcher,
        max_file_size: u64,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            ignore,
            max_file_size,
            events,
        }
    }
}

#[async_trait::async_trait]
impl PipelinePhase for CollectPhase {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn validate(&self, input: &PipelineInput) -> Result<(), CoreError> {
        if input.transaction_id.is_empty() {
            return Err(CoreError::validation("transaction id is required"));
        }
        Ok(())
    }

    async fn execute(&self, input: &PipelineInput) -> Result<PipelineOutput> {
        let mut output = PipelineOutput {
            metadata: input.metadata.clone(),
            ..Default::default()
        };
        let mut kept = Vec::with_capacity(input.changes.len());
        let total = input.changes.len() as u64;

        for (i, change) in input.changes.iter().enumerate() {
            if self.ignore.should_ignore(&change.path, change.is_directory) {
                debug!(path = %change.path.display(), "Ignoring change");
                continue;
            }

            if !change.is_directory
                && change.kind != ChangeKind::Delete
                && self.max_file_size > 0
                && change.size > self.max_file_size
            {
                warn!(
                    path = %change.path.display(),
                    size = change.size,
                    limit = self.max_file_size,
                    "File exceeds size limit"
                );
                output
                    .failed_files
                    .push(change.path.to_string_lossy().into_owned());
                continue;
            }

            kept.push(change.clone());

            // Directories carry no per-file state
            if !change.is_directory
                && (change.is_create_or_modify() || change.is_rename_or_move())
            {
                let key = change.path.to_string_lossy().into_owned();
                let mut state = FileState::new(key);
                let mtime =
                    DateTime::<Utc>::from_timestamp(change.timestamp, 0).unwrap_or_else(Utc::now);
                state.update_local_info(change.hash.clone(), mtime, change.size);
                output.file_states.push(state);
            }

            if (i + 1) % 10 == 0 || i + 1 == input.changes.len() {
                let _ = self.events.send(EngineEvent::Progress {
                    phase: "collect".to_string(),
                    completed: (i + 1) as u64,
                    total,
                });
            }
        }

        info!(
            collected = kept.len(),
            dropped = input.changes.len() - kept.len(),
            oversize = output.failed_files.len(),
            "File collection completed"
        );

        output
            .metadata
            .insert("collected".to_string(), kept.len().to_string());
        output.changes = Some(kept);
        Ok(output)
    }
}

// ============================================================================
// Analyze phase
// ============================================================================

/// Compares each candidate with its remote counterpart, emitting
/// both-modified conflicts and marking remote-less files pending
pub struct AnalyzePhase {
    store: Arc<dyn ObjectStore>,
    source_root: PathBuf,
    destination: String,
}

impl AnalyzePhase {
    pub fn new(store: Arc<dyn ObjectStore>, source_root: PathBuf, destination: String) -> Self {
        Self {
            store,
            source_root,
            destination,
        }
    }
}

#[async_trait::async_trait]
impl PipelinePhase for AnalyzePhase {
    fn name(&self) -> &'static str {
        "analyze"
    }

    fn validate(&self, _input: &PipelineInput) -> Result<(), CoreError> {
        Ok(())
    }

    async fn execute(&self, input: &PipelineInput) -> Result<PipelineOutput> {
        let mut output = PipelineOutput {
            metadata: input.metadata.clone(),
            ..Default::default()
        };

        for (path, state) in &input.file_states {
            let remote_path =
                map_remote_path(&self.source_root, &self.destination, Path::new(path));
            let meta = self.store.metadata(&remote_path).await?;

            let mut state = state.clone();
            match meta {
                None => {
                    // No remote counterpart yet
                    state.status = FileSyncStatus::Pending;
                }
                Some(meta) => {
                    if !state.local_hash.is_empty()
                        && !meta.hash.is_empty()
                        && state.local_hash != meta.hash
                    {
                        let local = ConflictFile {
                            path: path.clone(),
                            hash: state.local_hash.clone(),
                            size: state.local_size,
                            modified: state.local_mtime,
                        };
                        let conflict = Conflict::new(
                            path.clone(),
                            ConflictKind::BothModified,
                            local,
                            ConflictFile::from_metadata(&meta),
                        );
                        debug!(path = %path, "Both sides modified, conflict detected");
                        state.set_conflict(conflict.kind.as_str());
                        output.conflicts.push(conflict);
                    } else {
                        state.update_remote_info(
                            meta.hash.clone(),
                            meta.modified,
                            meta.size,
                            meta.remote_id.clone(),
                        );
                    }
                }
            }
            output.file_states.push(state);
        }

        info!(conflicts = output.conflicts.len(), "File analysis completed");
        output
            .metadata
            .insert("conflicts_detected".to_string(), output.conflicts.len().to_string());
        Ok(output)
    }
}

// ============================================================================
// Execute phase
// ============================================================================

/// Invokes the strategy over the run's changes and maintains per-file
/// state from the outcome
pub struct ExecutePhase {
    strategy: Arc<dyn SyncStrategy>,
    state_store: Arc<StateStore>,
    source_root: PathBuf,
    destination: String,
    events: broadcast::Sender<EngineEvent>,
}

impl ExecutePhase {
    pub fn new(
        strategy: Arc<dyn SyncStrategy>,
        state_store: Arc<StateStore>,
        source_root: PathBuf,
        destination: String,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            strategy,
            state_store,
            source_root,
            destination,
            events,
        }
    }
}

#[async_trait::async_trait]
impl PipelinePhase for ExecutePhase {
    fn name(&self) -> &'static str {
        "execute"
    }

    fn validate(&self, _input: &PipelineInput) -> Result<(), CoreError> {
        Ok(())
    }

    async fn execute(&self, input: &PipelineInput) -> Result<PipelineOutput> {
        let mut request = SyncRequest::new(self.source_root.clone(), self.destination.clone());
        request.changes = input.changes.clone();
        request.local_paths = input.local_paths.clone();

        self.strategy.validate(&request)?;

        let total = request.changes.len() as u64;
        let _ = self.events.send(EngineEvent::Progress {
            phase: "execute".to_string(),
            completed: 0,
            total,
        });

        let result = self.strategy.sync(&request).await?;

        let _ = self.events.send(EngineEvent::Progress {
            phase: "execute".to_string(),
            completed: total,
            total,
        });

        // Per-file state maintenance from the strategy outcome
        let failed_paths: HashSet<&str> =
            result.errors.iter().map(|e| e.path.as_str()).collect();
        let mut updated: Vec<FileState> = Vec::new();

        for change in &input.changes {
            let key = change.path.to_string_lossy().into_owned();

            if failed_paths.contains(key.as_str()) {
                let mut state = input
                    .file_states
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| FileState::new(&key));
                state.set_error("remote operation failed");
                updated.push(state);
                continue;
            }

            match change.kind {
                ChangeKind::Create
                | ChangeKind::Modify
                | ChangeKind::Rename
                | ChangeKind::Move => {
                    if change.is_directory {
                        continue;
                    }
                    if let Some(old_path) = &change.old_path {
                        self.state_store
                            .delete_file_state(&old_path.to_string_lossy())
                            .await?;
                    }

                    let mut state = input
                        .file_states
                        .get(&key)
                        .cloned()
                        .unwrap_or_else(|| FileState::new(&key));
                    if state.local_hash.is_empty() {
                        let mtime = DateTime::<Utc>::from_timestamp(change.timestamp, 0)
                            .unwrap_or_else(Utc::now);
                        state.update_local_info(change.hash.clone(), mtime, change.size);
                    }
                    // The upload placed the local content remotely
                    state.update_remote_info(
                        change.hash.clone(),
                        Some(Utc::now()),
                        change.size,
                        None,
                    );
                    if state.has_conflict {
                        state.resolve_conflict();
                    }
                    state.reset_retry();
                    updated.push(state);
                }
                ChangeKind::Delete => {
                    self.state_store.delete_file_state(&key).await?;
                }
                ChangeKind::Chmod => {}
            }
        }

        self.state_store.batch_upsert_file_states(&updated).await?;

        info!(
            uploaded = result.files_uploaded,
            downloaded = result.files_downloaded,
            deleted = result.files_deleted,
            skipped = result.files_skipped,
            bytes = result.bytes_transferred,
            "Sync execution completed"
        );

        let mut output = PipelineOutput {
            metadata: input.metadata.clone(),
            bytes_transferred: result.bytes_transferred,
            ..Default::default()
        };
        output.file_states = updated;
        output
            .metadata
            .insert("executed".to_string(), result.files_processed.to_string());
        output.result = Some(result);
        Ok(output)
    }
}

// ============================================================================
// Verify phase
// ============================================================================

/// Re-fetches remote metadata for every synced file in parallel and fails
/// the phase on any hash mismatch
///
/// Disabled for backup-direction strategies: versioned uploads leave the
/// original remote path holding the previous content by design.
pub struct VerifyPhase {
    store: Arc<dyn ObjectStore>,
    source_root: PathBuf,
    destination: String,
    enabled: bool,
}

impl VerifyPhase {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        source_root: PathBuf,
        destination: String,
        enabled: bool,
    ) -> Self {
        Self {
            store,
            source_root,
            destination,
            enabled,
        }
    }
}

#[async_trait::async_trait]
impl PipelinePhase for VerifyPhase {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn validate(&self, _input: &PipelineInput) -> Result<(), CoreError> {
        Ok(())
    }

    async fn execute(&self, input: &PipelineInput) -> Result<PipelineOutput> {
        let mut output = PipelineOutput {
            metadata: input.metadata.clone(),
            ..Default::default()
        };

        if !self.enabled {
            debug!("Verification skipped for this strategy");
            output
                .metadata
                .insert("verification".to_string(), "skipped".to_string());
            return Ok(output);
        }

        let targets: Vec<FileState> = input
            .file_states
            .values()
            .filter(|s| s.status == FileSyncStatus::Synced)
            .cloned()
            .collect();

        let checks = targets.iter().map(|state| {
            let store = Arc::clone(&self.store);
            let remote_path = map_remote_path(
                &self.source_root,
                &self.destination,
                Path::new(&state.path),
            );
            let local_hash = state.local_hash.clone();
            let path = state.path.clone();
            async move {
                match store.metadata(&remote_path).await {
                    Ok(Some(meta)) if meta.hash == local_hash => None,
                    Ok(Some(meta)) => Some(format!(
                        "hash mismatch for {path}: local {local_hash}, remote {}",
                        meta.hash
                    )),
                    Ok(None) => Some(format!("remote object missing for {path}")),
                    Err(e) => Some(format!("failed to verify {path}: {e:#}")),
                }
            }
        });

        let failures: Vec<String> = futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect();

        if !failures.is_empty() {
            for failure in &failures {
                warn!(failure = %failure, "Verification failure");
            }
            return Err(CoreError::sync(format!(
                "verification failed for {} files",
                failures.len()
            ))
            .with_context("first_failure", failures[0].clone())
            .into());
        }

        info!(verified = targets.len(), "Sync verification completed");
        output
            .metadata
            .insert("verification".to_string(), "passed".to_string());
        Ok(output)
    }
}
