//! Object store port
//!
//! The contract every remote backend must satisfy. Paths are POSIX-style
//! with forward slashes, relative to the store root (no leading slash
//! required; implementations normalize). Design rules:
//!
//! - `delete` is idempotent: a missing path reports success.
//! - `metadata` reports a missing path as `Ok(None)`, never as an error.
//! - `upload` ensures parent folders exist.
//! - `list` is paginated at [`LIST_PAGE_SIZE`] entries per request with a
//!   continuation token.
//!
//! Failures are classified through [`crate::error::CoreError`] where the
//! caller needs retryability; `anyhow::Result` carries them across the port
//! boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Page size for `list` requests
pub const LIST_PAGE_SIZE: usize = 100;

/// A file handed to `upload`
#[derive(Debug, Clone)]
pub struct StoreFile {
    /// Remote POSIX-style path
    pub path: String,
    pub size: u64,
    /// Content hash computed by the caller (may be empty for markers)
    pub hash: String,
    pub content: Vec<u8>,
    pub mime_type: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    pub is_folder: bool,
}

impl StoreFile {
    /// Builds a regular file upload
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            size: content.len() as u64,
            hash: String::new(),
            content,
            mime_type: None,
            modified: None,
            is_folder: false,
        }
    }

    /// Builds a zero-byte marker file (deletion/move markers in backup mode)
    pub fn marker(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            hash: String::new(),
            content: Vec::new(),
            mime_type: None,
            modified: Some(Utc::now()),
            is_folder: false,
        }
    }
}

/// Content returned by `download`
#[derive(Debug, Clone)]
pub struct RemoteContent {
    pub content: Vec<u8>,
    pub size: u64,
    pub hash: String,
    pub mime_type: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

/// Metadata for a remote path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteMetadata {
    pub path: String,
    pub size: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub is_folder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

/// One entry in a `list` page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub path: String,
    pub size: u64,
    pub is_folder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// A page of `list` results
#[derive(Debug, Clone)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    /// Token for the next page; `None` on the last page
    pub next_token: Option<String>,
}

/// Storage quota information
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaInfo {
    pub used: u64,
    pub available: u64,
    pub total: u64,
}

/// Port trait for remote object storage
///
/// Implementations must be safe to share across tasks; all operations are
/// cancellable at their await points.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads a file, creating missing parent folders
    async fn upload(&self, file: &StoreFile) -> anyhow::Result<()>;

    /// Downloads the content at a path
    async fn download(&self, path: &str) -> anyhow::Result<RemoteContent>;

    /// Deletes a path; a missing path is success
    async fn delete(&self, path: &str) -> anyhow::Result<()>;

    /// Lists entries under a folder, paginated
    async fn list(&self, folder: &str, page_token: Option<&str>) -> anyhow::Result<ListPage>;

    /// Fetches metadata for a path; `Ok(None)` when the path does not exist
    async fn metadata(&self, path: &str) -> anyhow::Result<Option<RemoteMetadata>>;

    /// Creates a folder (and missing parents)
    async fn create_folder(&self, path: &str) -> anyhow::Result<()>;

    /// Moves or renames a file or folder
    async fn rename(&self, source: &str, destination: &str) -> anyhow::Result<()>;

    /// Returns storage quota information
    async fn quota(&self) -> anyhow::Result<QuotaInfo>;

    /// Short provider name for logs and status output
    fn name(&self) -> &str;
}

/// Normalizes a remote path: forward slashes, no leading slash, no
/// duplicate separators
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for segment in path.replace('\\', "/").split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a/b/c.txt"), "a/b/c.txt");
        assert_eq!(normalize_path("a//b/./c.txt"), "a/b/c.txt");
        assert_eq!(normalize_path("a\\b\\c.txt"), "a/b/c.txt");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/"), "");
    }

    #[test]
    fn test_store_file_marker_is_empty() {
        let marker = StoreFile::marker("a/b.txt.deleted_20250101_000000");
        assert_eq!(marker.size, 0);
        assert!(marker.content.is_empty());
        assert!(!marker.is_folder);
        assert!(marker.modified.is_some());
    }

    #[test]
    fn test_store_file_new_sets_size() {
        let file = StoreFile::new("a.txt", b"hello".to_vec());
        assert_eq!(file.size, 5);
        assert_eq!(file.path, "a.txt");
    }
}
