//! Filesystem change events
//!
//! A [`ChangeEvent`] is produced by the watcher after debouncing and hash
//! verification, deduplicated by the change queue, and consumed by the
//! engine pipeline. Events are plain values; components never share mutable
//! references to them.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A file or directory was created
    Create,
    /// A file's content was modified
    Modify,
    /// A file or directory was deleted
    Delete,
    /// A file or directory was renamed
    Rename,
    /// A file or directory was moved
    Move,
    /// File permissions changed
    Chmod,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
            ChangeKind::Rename => "rename",
            ChangeKind::Move => "move",
            ChangeKind::Chmod => "chmod",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an event originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Local,
    Remote,
    Manual,
}

/// Processing status of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
    Deferred,
}

/// A single filesystem change, debounced and hash-verified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Generated event id (`evt_<uuid>`)
    pub id: String,
    pub kind: ChangeKind,
    pub source: EventSource,

    pub path: PathBuf,
    /// Previous path for rename/move events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<PathBuf>,

    /// Unix timestamp (seconds) when the event settled
    pub timestamp: i64,
    /// Size of the file at settle time (0 for deletes)
    pub size: u64,
    /// Content hash at settle time (empty for deletes and directories)
    #[serde(default)]
    pub hash: String,
    pub is_directory: bool,

    pub status: EventStatus,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ChangeEvent {
    /// Creates a pending local event for the given path
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::new_v4()),
            kind,
            source: EventSource::Local,
            path: path.into(),
            old_path: None,
            timestamp: Utc::now().timestamp(),
            size: 0,
            hash: String::new(),
            is_directory: false,
            status: EventStatus::Pending,
            retries: 0,
            last_error: None,
            metadata: HashMap::new(),
        }
    }

    /// True for create or modify events
    pub fn is_create_or_modify(&self) -> bool {
        matches!(self.kind, ChangeKind::Create | ChangeKind::Modify)
    }

    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Delete
    }

    /// True for rename or move events
    pub fn is_rename_or_move(&self) -> bool {
        matches!(self.kind, ChangeKind::Rename | ChangeKind::Move)
    }

    /// Records a processing failure and bumps the retry count
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = EventStatus::Failed;
        self.last_error = Some(message.into());
        self.retries += 1;
    }

    /// Marks the event as fully processed
    pub fn mark_processed(&mut self) {
        self.status = EventStatus::Completed;
    }

    /// Whether the event may be retried after a failure
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.status == EventStatus::Failed && self.retries < max_retries
    }
}

/// A bounded set of events handed to the pipeline in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    /// Generated batch id (`batch_<uuid>`)
    pub id: String,
    pub events: Vec<ChangeEvent>,
    pub created_at: i64,
}

impl EventBatch {
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self {
            id: format!("batch_{}", uuid::Uuid::new_v4()),
            events,
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
