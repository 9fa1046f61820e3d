//! Sync strategy port
//!
//! A strategy maps change events onto concrete object-store operations. The
//! engine selects one strategy at construction time; it is not swapped while
//! running.
//!
//! The engine-to-strategy contract is carried by [`SyncRequest`]: the engine
//! names the local source root and remote destination explicitly, and
//! supplies the authoritative set of locally-present paths so the mirror
//! strategy can delete remote extras without re-enumerating the tree.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conflict::{Conflict, Resolution, ResolutionStrategy};
use crate::domain::event::ChangeEvent;
use crate::error::CoreError;

/// Direction of a sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    OneWay,
    Mirror,
    Backup,
}

/// Static configuration of a strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Default conflict handling for this policy
    pub conflict_resolution: ResolutionStrategy,
    /// Maximum file size in bytes; 0 disables the limit
    pub max_file_size: u64,
    /// Skip remote deletes for local deletions
    pub preserve_deleted: bool,
    /// Upload to versioned paths instead of overwriting
    pub version_control: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            conflict_resolution: ResolutionStrategy::KeepLocal,
            max_file_size: 0,
            preserve_deleted: false,
            version_control: false,
        }
    }
}

/// A single-file failure recorded by a strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub path: String,
    pub operation: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SyncError {
    pub fn new(
        path: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            operation: operation.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of one strategy run over a batch of changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    pub files_processed: u64,
    pub files_uploaded: u64,
    pub files_downloaded: u64,
    pub files_deleted: u64,
    pub files_skipped: u64,
    pub bytes_transferred: u64,

    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    #[serde(default)]
    pub errors: Vec<SyncError>,
    pub success: bool,
}

impl SyncResult {
    /// Starts a result with the clock running
    pub fn started() -> Self {
        Self {
            start_time: Utc::now(),
            end_time: None,
            files_processed: 0,
            files_uploaded: 0,
            files_downloaded: 0,
            files_deleted: 0,
            files_skipped: 0,
            bytes_transferred: 0,
            conflicts: Vec::new(),
            errors: Vec::new(),
            success: false,
        }
    }

    /// Stamps the end time and computes `success` from the error and
    /// conflict lists
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
        self.success = self.errors.is_empty() && self.conflicts.is_empty();
    }

    /// Records a single-file failure without aborting the batch
    pub fn record_error(&mut self, error: SyncError) {
        self.errors.push(error);
    }

    /// Wall-clock duration, if finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// The engine-to-strategy contract for one run
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Local directory tree being synchronized
    pub source_root: PathBuf,
    /// Remote destination root (POSIX-style, may be empty for the store
    /// root)
    pub destination: String,
    /// Deduplicated change events for this run
    pub changes: Vec<ChangeEvent>,
    /// Authoritative set of locally-present paths, remote-relative
    /// POSIX-style. Supplied by the engine; used by the mirror strategy to
    /// delete remote extras.
    pub local_paths: BTreeSet<String>,
}

impl SyncRequest {
    pub fn new(source_root: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source_root: source_root.into(),
            destination: destination.into(),
            changes: Vec::new(),
            local_paths: BTreeSet::new(),
        }
    }

    /// Maps a local path onto its remote POSIX path under this request's
    /// destination
    pub fn remote_path_for(&self, local: &std::path::Path) -> String {
        map_remote_path(&self.source_root, &self.destination, local)
    }
}

/// Maps a local path onto a remote POSIX path: the path relative to
/// `source_root`, prefixed with `destination`
pub fn map_remote_path(
    source_root: &std::path::Path,
    destination: &str,
    local: &std::path::Path,
) -> String {
    use crate::ports::object_store::normalize_path;

    let relative = local
        .strip_prefix(source_root)
        .unwrap_or(local)
        .to_string_lossy()
        .replace('\\', "/");

    if destination.is_empty() {
        normalize_path(&relative)
    } else {
        normalize_path(&format!("{destination}/{relative}"))
    }
}

/// Policy object mapping change events to remote operations
#[async_trait::async_trait]
pub trait SyncStrategy: Send + Sync {
    /// Short policy name for logs and status output
    fn name(&self) -> &'static str;

    /// Processes the batch, never aborting on single-file failures
    async fn sync(&self, request: &SyncRequest) -> anyhow::Result<SyncResult>;

    /// Produces this policy's resolution for a conflict
    async fn resolve_conflict(&self, conflict: &Conflict) -> anyhow::Result<Resolution>;

    /// Validates that a request can be attempted
    fn validate(&self, request: &SyncRequest) -> Result<(), CoreError>;

    fn direction(&self) -> SyncDirection;

    /// Whether interrupted syncs can be resumed
    fn supports_resume(&self) -> bool;

    fn configuration(&self) -> &StrategyConfig;
}
