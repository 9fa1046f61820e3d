//! Sync transactions
//!
//! One [`SyncTransaction`] describes one pipeline execution. It is distinct
//! from a database transaction. Status moves `Pending -> Running ->
//! {Completed, Failed, Cancelled}`; any terminal status sets the end time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::strategy::SyncResult;

/// Kind of sync transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Upload,
    Download,
    Delete,
    FullSync,
    PartialSync,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Upload => "upload",
            TransactionKind::Download => "download",
            TransactionKind::Delete => "delete",
            TransactionKind::FullSync => "full_sync",
            TransactionKind::PartialSync => "partial_sync",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a sync transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }
}

/// Record of a single pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTransaction {
    /// Generated id (`txn_<uuid>`)
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub bytes_transferred: u64,
    #[serde(default)]
    pub files_affected: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Result snapshot from the strategy, present on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncResult>,
}

impl SyncTransaction {
    /// Creates a new transaction in `Running` status
    pub fn begin(kind: TransactionKind) -> Self {
        Self {
            id: format!("txn_{}", uuid::Uuid::new_v4()),
            start_time: Utc::now(),
            end_time: None,
            kind,
            status: TransactionStatus::Running,
            bytes_transferred: 0,
            files_affected: Vec::new(),
            errors: Vec::new(),
            result: None,
        }
    }

    /// Marks the transaction completed and stamps the end time
    pub fn complete(&mut self, result: SyncResult) {
        self.bytes_transferred = result.bytes_transferred;
        self.result = Some(result);
        self.status = TransactionStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    /// Marks the transaction failed and stamps the end time
    pub fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.status = TransactionStatus::Failed;
        self.end_time = Some(Utc::now());
    }

    /// Marks the transaction cancelled and stamps the end time
    pub fn cancel(&mut self) {
        self.status = TransactionStatus::Cancelled;
        self.end_time = Some(Utc::now());
    }

    /// Wall-clock duration, if the transaction has ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}
