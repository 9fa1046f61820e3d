//! Aggregate engine state
//!
//! A singleton persisted under the `state` bucket (key `current`). While
//! `current_operation` is set, `is_running` is true; `is_paused` implies
//! `is_running`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounded length of the error and warning histories
const HISTORY_LIMIT: usize = 100;

/// Overall synchronization state of the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub version: String,
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<DateTime<Utc>>,

    pub total_files: u64,
    pub synced_files: u64,
    pub pending_files: u64,
    pub failed_files: u64,
    pub ignored_files: u64,
    pub conflict_files: u64,

    pub total_bytes: u64,
    pub synced_bytes: u64,
    pub pending_bytes: u64,

    /// Name of the operation in progress, empty when idle
    #[serde(default)]
    pub current_operation: String,
    /// Progress of the current operation, 0..=100
    pub operation_progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_started: Option<DateTime<Utc>>,

    pub is_running: bool,
    pub is_paused: bool,
    pub is_initialized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub consecutive_errors: u32,

    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            version: "1.0.0".to_string(),
            schema_version: 1,
            last_sync_time: None,
            last_success_time: None,
            total_files: 0,
            synced_files: 0,
            pending_files: 0,
            failed_files: 0,
            ignored_files: 0,
            conflict_files: 0,
            total_bytes: 0,
            synced_bytes: 0,
            pending_bytes: 0,
            current_operation: String::new(),
            operation_progress: 0.0,
            operation_started: None,
            is_running: false,
            is_paused: false,
            is_initialized: true,
            last_error: None,
            consecutive_errors: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            provider: None,
            strategy: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the progress of the current operation, clamped to 0..=100
    pub fn update_progress(&mut self, progress: f64) {
        self.operation_progress = progress.clamp(0.0, 100.0);
    }

    /// Marks the start of a named operation
    pub fn start_operation(&mut self, operation: impl Into<String>) {
        self.current_operation = operation.into();
        self.operation_started = Some(Utc::now());
        self.operation_progress = 0.0;
        self.is_running = true;
        self.is_paused = false;
    }

    /// Marks the end of the current operation
    pub fn end_operation(&mut self, success: bool) {
        self.current_operation = String::new();
        self.operation_progress = 100.0;
        self.is_running = false;

        let now = Utc::now();
        if success {
            self.last_success_time = Some(now);
            self.consecutive_errors = 0;
        } else {
            self.consecutive_errors += 1;
        }
        self.last_sync_time = Some(now);
    }

    /// Appends an error, keeping the last [`HISTORY_LIMIT`] entries
    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.last_error = Some(message.clone());
        self.errors.push(message);
        self.consecutive_errors += 1;

        if self.errors.len() > HISTORY_LIMIT {
            let excess = self.errors.len() - HISTORY_LIMIT;
            self.errors.drain(..excess);
        }
    }

    /// Appends a warning, keeping the last [`HISTORY_LIMIT`] entries
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());

        if self.warnings.len() > HISTORY_LIMIT {
            let excess = self.warnings.len() - HISTORY_LIMIT;
            self.warnings.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = SyncState::new();
        assert!(!state.is_running);
        assert!(!state.is_paused);
        assert!(state.is_initialized);
        assert!(state.current_operation.is_empty());
    }

    #[test]
    fn test_operation_implies_running() {
        let mut state = SyncState::new();
        state.start_operation("full_sync");
        assert!(state.is_running);
        assert!(!state.is_paused);
        assert_eq!(state.current_operation, "full_sync");
        assert_eq!(state.operation_progress, 0.0);
        assert!(state.operation_started.is_some());
    }

    #[test]
    fn test_end_operation_success() {
        let mut state = SyncState::new();
        state.consecutive_errors = 4;
        state.start_operation("full_sync");
        state.end_operation(true);

        assert!(!state.is_running);
        assert!(state.current_operation.is_empty());
        assert_eq!(state.operation_progress, 100.0);
        assert_eq!(state.consecutive_errors, 0);
        assert!(state.last_success_time.is_some());
        assert!(state.last_sync_time.is_some());
    }

    #[test]
    fn test_end_operation_failure_counts() {
        let mut state = SyncState::new();
        state.start_operation("full_sync");
        state.end_operation(false);
        assert_eq!(state.consecutive_errors, 1);
        assert!(state.last_success_time.is_none());
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut state = SyncState::new();
        state.update_progress(150.0);
        assert_eq!(state.operation_progress, 100.0);
        state.update_progress(-4.0);
        assert_eq!(state.operation_progress, 0.0);
        state.update_progress(42.5);
        assert_eq!(state.operation_progress, 42.5);
    }

    #[test]
    fn test_error_history_is_bounded() {
        let mut state = SyncState::new();
        for i in 0..150 {
            state.add_error(format!("error {i}"));
        }
        assert_eq!(state.errors.len(), 100);
        assert_eq!(state.errors.first().unwrap(), "error 50");
        assert_eq!(state.last_error.as_deref(), Some("error 149"));
    }

    #[test]
    fn test_warning_history_is_bounded() {
        let mut state = SyncState::new();
        for i in 0..120 {
            state.add_warning(format!("warning {i}"));
        }
        assert_eq!(state.warnings.len(), 100);
        assert_eq!(state.warnings.first().unwrap(), "warning 20");
    }

    #[test]
    fn test_json_round_trip() {
        let mut state = SyncState::new();
        state.start_operation("full_sync");
        state.add_error("boom");

        let json = serde_json::to_string(&state).unwrap();
        let back: SyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.current_operation, "full_sync");
        assert!(back.is_running);
        assert_eq!(back.errors, vec!["boom".to_string()]);
    }
}
