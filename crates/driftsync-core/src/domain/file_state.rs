//! Per-file synchronization state
//!
//! Keyed by absolute local path in the state store. The central invariant:
//! a file is `Synced` if and only if its local and remote hashes are equal
//! and both non-empty. The update helpers below maintain that invariant.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Synchronization status of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSyncStatus {
    Pending,
    Synced,
    Modified,
    Conflict,
    Error,
    Deleted,
    Ignored,
    Uploading,
    Downloading,
}

impl FileSyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileSyncStatus::Pending => "pending",
            FileSyncStatus::Synced => "synced",
            FileSyncStatus::Modified => "modified",
            FileSyncStatus::Conflict => "conflict",
            FileSyncStatus::Error => "error",
            FileSyncStatus::Deleted => "deleted",
            FileSyncStatus::Ignored => "ignored",
            FileSyncStatus::Uploading => "uploading",
            FileSyncStatus::Downloading => "downloading",
        }
    }
}

impl std::fmt::Display for FileSyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable state of a single watched file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileState {
    /// Absolute local path (store key)
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,

    #[serde(default)]
    pub local_hash: String,
    #[serde(default)]
    pub remote_hash: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_mtime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_mtime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_time: Option<DateTime<Utc>>,

    pub local_size: u64,
    pub remote_size: u64,

    pub status: FileSyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,

    pub local_version: u32,
    pub remote_version: u32,

    pub has_conflict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_detected: Option<DateTime<Utc>>,

    pub is_directory: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl FileState {
    /// Creates a fresh pending state for a path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            remote_id: None,
            local_hash: String::new(),
            remote_hash: String::new(),
            local_mtime: None,
            remote_mtime: None,
            last_sync_time: None,
            last_check_time: Some(Utc::now()),
            local_size: 0,
            remote_size: 0,
            status: FileSyncStatus::Pending,
            last_error: None,
            retry_count: 0,
            max_retries: 3,
            local_version: 0,
            remote_version: 0,
            has_conflict: false,
            conflict_kind: None,
            conflict_detected: None,
            is_directory: false,
            metadata: HashMap::new(),
        }
    }

    /// True when the file still needs a remote operation
    pub fn needs_sync(&self) -> bool {
        self.status != FileSyncStatus::Synced || self.local_hash != self.remote_hash
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn reset_retry(&mut self) {
        self.retry_count = 0;
        self.last_error = None;
    }

    /// Records a sync failure for this file
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = FileSyncStatus::Error;
        self.last_error = Some(message.into());
        self.increment_retry();
    }

    /// Marks the file as conflicted
    pub fn set_conflict(&mut self, kind: impl Into<String>) {
        self.status = FileSyncStatus::Conflict;
        self.has_conflict = true;
        self.conflict_kind = Some(kind.into());
        self.conflict_detected = Some(Utc::now());
    }

    /// Clears conflict markers
    ///
    /// The file only becomes `Synced` when both hashes are present and
    /// equal; a resolved conflict whose sides still differ stays
    /// `Modified` (or `Error`) until the next remote operation catches
    /// up.
    pub fn resolve_conflict(&mut self) {
        self.has_conflict = false;
        self.conflict_kind = None;
        self.conflict_detected = None;
        if !self.local_hash.is_empty() && self.local_hash == self.remote_hash {
            self.status = FileSyncStatus::Synced;
        } else if self.status != FileSyncStatus::Error {
            self.status = FileSyncStatus::Modified;
        }
    }

    /// Updates the local side after observing the file on disk
    ///
    /// Moves the status to `Modified` when the hashes diverge.
    pub fn update_local_info(&mut self, hash: impl Into<String>, mtime: DateTime<Utc>, size: u64) {
        self.local_hash = hash.into();
        self.local_mtime = Some(mtime);
        self.local_size = size;
        self.local_version += 1;
        self.last_check_time = Some(Utc::now());

        if self.local_hash != self.remote_hash {
            self.status = FileSyncStatus::Modified;
        }
    }

    /// Updates the remote side after a successful remote operation
    ///
    /// Moves the status to `Synced` when both hashes are present and equal.
    pub fn update_remote_info(
        &mut self,
        hash: impl Into<String>,
        mtime: Option<DateTime<Utc>>,
        size: u64,
        remote_id: Option<String>,
    ) {
        self.remote_hash = hash.into();
        self.remote_mtime = mtime;
        self.remote_size = size;
        if remote_id.is_some() {
            self.remote_id = remote_id;
        }
        self.remote_version += 1;
        self.last_sync_time = Some(Utc::now());

        if !self.local_hash.is_empty() && self.local_hash == self.remote_hash {
            self.status = FileSyncStatus::Synced;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_pending() {
        let state = FileState::new("/data/a.txt");
        assert_eq!(state.status, FileSyncStatus::Pending);
        assert!(state.needs_sync());
        assert!(state.can_retry());
    }

    #[test]
    fn test_synced_iff_hashes_match() {
        let mut state = FileState::new("/data/a.txt");
        state.update_local_info("h1", Utc::now(), 10);
        assert_eq!(state.status, FileSyncStatus::Modified);

        state.update_remote_info("h1", Some(Utc::now()), 10, Some("rid".into()));
        assert_eq!(state.status, FileSyncStatus::Synced);
        assert!(!state.needs_sync());

        // Diverging local hash flips back to Modified
        state.update_local_info("h2", Utc::now(), 11);
        assert_eq!(state.status, FileSyncStatus::Modified);
        assert!(state.needs_sync());
    }

    #[test]
    fn test_empty_hashes_never_synced() {
        let mut state = FileState::new("/data/a.txt");
        // Both hashes empty and equal, but Synced requires non-empty hashes
        state.update_remote_info("", None, 0, None);
        assert_ne!(state.status, FileSyncStatus::Synced);
    }

    #[test]
    fn test_retry_bookkeeping() {
        let mut state = FileState::new("/data/a.txt");
        state.set_error("upload failed");
        state.set_error("upload failed");
        state.set_error("upload failed");
        assert_eq!(state.retry_count, 3);
        assert!(!state.can_retry());

        state.reset_retry();
        assert_eq!(state.retry_count, 0);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_conflict_lifecycle() {
        let mut state = FileState::new("/data/a.txt");
        state.update_local_info("h1", Utc::now(), 10);
        state.update_remote_info("h1", None, 10, None);

        state.set_conflict("both_modified");
        assert!(state.has_conflict);
        assert_eq!(state.status, FileSyncStatus::Conflict);
        assert!(state.conflict_detected.is_some());

        // Hashes agree, so resolving lands on Synced
        state.resolve_conflict();
        assert!(!state.has_conflict);
        assert_eq!(state.status, FileSyncStatus::Synced);
        assert!(state.conflict_kind.is_none());
    }

    #[test]
    fn test_resolve_conflict_with_mismatched_hashes_stays_modified() {
        let mut state = FileState::new("/data/a.txt");
        state.update_local_info("h1", Utc::now(), 10);
        state.update_remote_info("h2", None, 10, None);
        state.set_conflict("both_modified");

        state.resolve_conflict();
        assert!(!state.has_conflict);
        assert!(state.conflict_kind.is_none());
        // Diverged hashes never produce Synced
        assert_eq!(state.status, FileSyncStatus::Modified);

        // Empty hashes do not count as matching either
        let mut empty = FileState::new("/data/b.txt");
        empty.set_conflict("both_modified");
        empty.resolve_conflict();
        assert_ne!(empty.status, FileSyncStatus::Synced);
    }

    #[test]
    fn test_resolve_conflict_preserves_error_status() {
        let mut state = FileState::new("/data/a.txt");
        state.set_conflict("both_modified");
        state.set_error("upload failed");
        assert_eq!(state.status, FileSyncStatus::Error);

        state.resolve_conflict();
        assert!(!state.has_conflict);
        assert_eq!(state.status, FileSyncStatus::Error);
    }

    #[test]
    fn test_versions_increment() {
        let mut state = FileState::new("/data/a.txt");
        state.update_local_info("h1", Utc::now(), 1);
        state.update_local_info("h2", Utc::now(), 2);
        state.update_remote_info("h2", None, 2, None);
        assert_eq!(state.local_version, 2);
        assert_eq!(state.remote_version, 1);
    }

    #[test]
    fn test_json_round_trip() {
        let mut state = FileState::new("/data/a.txt");
        state.update_local_info("h1", Utc::now(), 5);
        let json = serde_json::to_string(&state).unwrap();
        let back: FileState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.path, state.path);
        assert_eq!(back.local_hash, "h1");
        assert_eq!(back.status, FileSyncStatus::Modified);
    }
}
