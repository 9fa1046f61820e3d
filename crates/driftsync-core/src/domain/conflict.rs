//! Conflicts and resolutions
//!
//! A [`Conflict`] records two divergent versions of a path; a
//! [`Resolution`] records how the divergence was settled. Conflicts are
//! values, not errors: they flow through pipeline output and the resolver,
//! never through error channels.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::object_store::RemoteMetadata;

/// Bounded length of the per-conflict history
const HISTORY_LIMIT: usize = 50;

/// Kind of conflict detected between local and remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides modified since the last sync
    BothModified,
    /// One side deleted, the other modified
    DeleteModify,
    /// Naming collision (case sensitivity, special characters)
    Naming,
    /// Permission mismatch
    Permission,
    /// File on one side, directory on the other
    Type,
    /// Size limits exceeded
    Size,
    /// Version counters diverged
    Version,
}

impl ConflictKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictKind::BothModified => "both_modified",
            ConflictKind::DeleteModify => "delete_modify",
            ConflictKind::Naming => "naming",
            ConflictKind::Permission => "permission",
            ConflictKind::Type => "type",
            ConflictKind::Size => "size",
            ConflictKind::Version => "version",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Resolution progress of a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Pending,
    InProgress,
    Resolved,
    Failed,
    Deferred,
}

/// Snapshot of one side of a conflict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictFile {
    pub path: String,
    #[serde(default)]
    pub hash: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl ConflictFile {
    /// Builds the remote-side snapshot from store metadata
    pub fn from_metadata(meta: &RemoteMetadata) -> Self {
        Self {
            path: meta.path.clone(),
            hash: meta.hash.clone(),
            size: meta.size,
            modified: meta.modified,
        }
    }
}

/// A detected synchronization conflict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Generated id (`cfl_<uuid>`)
    pub id: String,
    pub path: String,
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,

    pub local: ConflictFile,
    pub remote: ConflictFile,

    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,

    pub resolution_status: ResolutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub auto_resolvable: bool,
    pub user_required: bool,

    pub attempt_count: u32,
    pub max_attempts: u32,
    #[serde(default)]
    pub history: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Conflict {
    pub fn new(
        path: impl Into<String>,
        kind: ConflictKind,
        local: ConflictFile,
        remote: ConflictFile,
    ) -> Self {
        Self {
            id: format!("cfl_{}", uuid::Uuid::new_v4()),
            path: path.into(),
            kind,
            severity: ConflictSeverity::Medium,
            local,
            remote,
            detected_at: Utc::now(),
            last_attempt: None,
            resolution_status: ResolutionStatus::Pending,
            resolution: None,
            auto_resolvable: false,
            user_required: false,
            attempt_count: 0,
            max_attempts: 3,
            history: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Whether the conflict qualifies for automatic resolution
    ///
    /// Low-severity and naming conflicts always qualify. A both-modified
    /// conflict qualifies when one side dominates by more than 24 hours.
    pub fn can_auto_resolve(&self) -> bool {
        if self.user_required || self.resolution_status == ResolutionStatus::Resolved {
            return false;
        }

        if self.severity == ConflictSeverity::Low {
            return true;
        }

        match self.kind {
            ConflictKind::Naming => true,
            ConflictKind::BothModified => {
                if let (Some(local), Some(remote)) = (self.local.modified, self.remote.modified) {
                    let diff = local - remote;
                    if diff > chrono::Duration::hours(24) || diff < chrono::Duration::hours(-24) {
                        return true;
                    }
                }
                self.auto_resolvable
            }
            _ => self.auto_resolvable,
        }
    }

    /// Records a resolution attempt; exhausting attempts flags the conflict
    /// for the user
    pub fn mark_attempted(&mut self) {
        self.attempt_count += 1;
        self.last_attempt = Some(Utc::now());
        if self.attempt_count >= self.max_attempts {
            self.user_required = true;
        }
    }

    /// Attaches the final resolution
    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = Some(resolution);
        self.resolution_status = ResolutionStatus::Resolved;
    }

    /// Appends a timestamped history entry, keeping the last
    /// [`HISTORY_LIMIT`] entries
    pub fn add_history(&mut self, entry: impl AsRef<str>) {
        self.history
            .push(format!("[{}] {}", Utc::now().to_rfc3339(), entry.as_ref()));
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution_status == ResolutionStatus::Resolved
    }
}

/// Strategy used to resolve a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    KeepLocal,
    KeepRemote,
    KeepBoth,
    KeepNewer,
    KeepLarger,
    Merge,
    Rename,
    Skip,
    Interactive,
    Custom,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::KeepLocal => "keep_local",
            ResolutionStrategy::KeepRemote => "keep_remote",
            ResolutionStrategy::KeepBoth => "keep_both",
            ResolutionStrategy::KeepNewer => "keep_newer",
            ResolutionStrategy::KeepLarger => "keep_larger",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Rename => "rename",
            ResolutionStrategy::Skip => "skip",
            ResolutionStrategy::Interactive => "interactive",
            ResolutionStrategy::Custom => "custom",
        }
    }

    /// Parses the snake_case form used in configuration files
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keep_local" => Some(Self::KeepLocal),
            "keep_remote" => Some(Self::KeepRemote),
            "keep_both" => Some(Self::KeepBoth),
            "keep_newer" => Some(Self::KeepNewer),
            "keep_larger" => Some(Self::KeepLarger),
            "merge" => Some(Self::Merge),
            "rename" => Some(Self::Rename),
            "skip" => Some(Self::Skip),
            "interactive" => Some(Self::Interactive),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the conflict survived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Local,
    Remote,
    Merged,
}

/// Outcome of resolving a conflict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub strategy: ResolutionStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    /// Path the surviving local copy was placed at (KeepBoth, versioning)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<String>,
    /// Path the losing side was preserved at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    pub resolved_at: DateTime<Utc>,
    pub manual: bool,
}

impl Resolution {
    pub fn new(strategy: ResolutionStrategy) -> Self {
        Self {
            strategy,
            winner: None,
            resolved_path: None,
            backup_path: None,
            resolved_at: Utc::now(),
            manual: false,
        }
    }
}
