//! In-memory object store
//!
//! Test double for the [`ObjectStore`] port. Behaves like a real backend:
//! parent folders are materialized on upload, deletes are idempotent,
//! `metadata` on a missing path is `None`, and `list` paginates at the
//! contract page size. Supports simple fault injection so callers can
//! exercise retry and error paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::CoreError;
use crate::ports::object_store::{
    normalize_path, ListPage, ObjectStore, QuotaInfo, RemoteContent, RemoteEntry, RemoteMetadata,
    StoreFile, LIST_PAGE_SIZE,
};

#[derive(Debug, Clone)]
struct StoredObject {
    content: Vec<u8>,
    hash: String,
    mime_type: Option<String>,
    modified: Option<DateTime<Utc>>,
    is_folder: bool,
    remote_id: String,
    version: u32,
}

/// In-memory [`ObjectStore`] implementation
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    /// Remaining upload calls that should fail with a network error
    fail_uploads: AtomicU32,
    /// Remaining delete calls that should fail with a network error
    fail_deletes: AtomicU32,
    /// Remaining metadata calls that should fail with a network error
    fail_metadata: AtomicU32,
    upload_calls: AtomicU64,
    download_calls: AtomicU64,
    delete_calls: AtomicU64,
    metadata_calls: AtomicU64,
    next_id: AtomicU64,
    quota_total: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.quota_total.store(10 * 1024 * 1024 * 1024, Ordering::Relaxed);
        store
    }

    /// Makes the next `n` uploads fail with a retryable network error
    pub fn fail_next_uploads(&self, n: u32) {
        self.fail_uploads.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` deletes fail with a retryable network error
    pub fn fail_next_deletes(&self, n: u32) {
        self.fail_deletes.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` metadata lookups fail with a retryable network
    /// error
    pub fn fail_next_metadata(&self, n: u32) {
        self.fail_metadata.store(n, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> u64 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> u64 {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_count(&self) -> u64 {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    /// Seeds an object directly, bypassing counters and fault injection
    pub async fn seed(&self, path: &str, content: &[u8], hash: &str) {
        let path = normalize_path(path);
        self.ensure_parents(&path).await;
        let mut objects = self.objects.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        objects.insert(
            path,
            StoredObject {
                content: content.to_vec(),
                hash: hash.to_string(),
                mime_type: None,
                modified: Some(Utc::now()),
                is_folder: false,
                remote_id: format!("mem_{id}"),
                version: 1,
            },
        );
    }

    /// Returns all non-folder paths currently stored, sorted
    pub async fn file_paths(&self) -> Vec<String> {
        let objects = self.objects.lock().await;
        objects
            .iter()
            .filter(|(_, o)| !o.is_folder)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Returns the stored hash for a path, if present
    pub async fn hash_of(&self, path: &str) -> Option<String> {
        let objects = self.objects.lock().await;
        objects.get(&normalize_path(path)).map(|o| o.hash.clone())
    }

    async fn ensure_parents(&self, path: &str) {
        let mut objects = self.objects.lock().await;
        let mut prefix = String::new();
        let segments: Vec<&str> = path.split('/').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if !objects.contains_key(&prefix) {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                objects.insert(
                    prefix.clone(),
                    StoredObject {
                        content: Vec::new(),
                        hash: String::new(),
                        mime_type: None,
                        modified: Some(Utc::now()),
                        is_folder: true,
                        remote_id: format!("mem_{id}"),
                        version: 1,
                    },
                );
            }
        }
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(&self, file: &StoreFile) -> anyhow::Result<()> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_fault(&self.fail_uploads) {
            return Err(CoreError::network("injected upload failure").into());
        }

        let path = normalize_path(&file.path);
        if path.is_empty() {
            return Err(CoreError::validation("upload path is empty").into());
        }
        self.ensure_parents(&path).await;

        let mut objects = self.objects.lock().await;
        let version = objects.get(&path).map(|o| o.version + 1).unwrap_or(1);
        let remote_id = objects
            .get(&path)
            .map(|o| o.remote_id.clone())
            .unwrap_or_else(|| format!("mem_{}", self.next_id.fetch_add(1, Ordering::SeqCst)));

        debug!(path = %path, size = file.size, "memory store upload");
        objects.insert(
            path,
            StoredObject {
                content: file.content.clone(),
                hash: file.hash.clone(),
                mime_type: file.mime_type.clone(),
                modified: file.modified.or_else(|| Some(Utc::now())),
                is_folder: file.is_folder,
                remote_id,
                version,
            },
        );
        Ok(())
    }

    async fn download(&self, path: &str) -> anyhow::Result<RemoteContent> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let path = normalize_path(path);
        let objects = self.objects.lock().await;
        let object = objects
            .get(&path)
            .ok_or_else(|| CoreError::provider(format!("no object at '{path}'")))?;
        Ok(RemoteContent {
            content: object.content.clone(),
            size: object.content.len() as u64,
            hash: object.hash.clone(),
            mime_type: object.mime_type.clone(),
            modified: object.modified,
        })
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_fault(&self.fail_deletes) {
            return Err(CoreError::network("injected delete failure").into());
        }

        let path = normalize_path(path);
        let mut objects = self.objects.lock().await;
        // Idempotent: removing a missing path is success
        if objects.remove(&path).is_none() {
            debug!(path = %path, "delete of missing path, treating as success");
            return Ok(());
        }
        // Drop children when the target was a folder
        let child_prefix = format!("{path}/");
        objects.retain(|key, _| !key.starts_with(&child_prefix));
        Ok(())
    }

    async fn list(&self, folder: &str, page_token: Option<&str>) -> anyhow::Result<ListPage> {
        let folder = normalize_path(folder);
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{folder}/")
        };

        let objects = self.objects.lock().await;
        let mut matching: Vec<RemoteEntry> = objects
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix) && !path.is_empty())
            .map(|(path, object)| RemoteEntry {
                path: path.clone(),
                size: object.content.len() as u64,
                is_folder: object.is_folder,
                modified: object.modified,
            })
            .collect();
        matching.sort_by(|a, b| a.path.cmp(&b.path));

        let offset: usize = page_token.map(|t| t.parse().unwrap_or(0)).unwrap_or(0);
        let page: Vec<RemoteEntry> = matching.iter().skip(offset).take(LIST_PAGE_SIZE).cloned().collect();
        let next_token = if offset + page.len() < matching.len() {
            Some((offset + page.len()).to_string())
        } else {
            None
        };

        Ok(ListPage {
            entries: page,
            next_token,
        })
    }

    async fn metadata(&self, path: &str) -> anyhow::Result<Option<RemoteMetadata>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_fault(&self.fail_metadata) {
            return Err(CoreError::network("injected metadata failure").into());
        }

        let path = normalize_path(path);
        let objects = self.objects.lock().await;
        Ok(objects.get(&path).map(|object| RemoteMetadata {
            path: path.clone(),
            size: object.content.len() as u64,
            hash: object.hash.clone(),
            modified: object.modified,
            mime_type: object.mime_type.clone(),
            is_folder: object.is_folder,
            remote_id: Some(object.remote_id.clone()),
            version: Some(object.version.to_string()),
            attributes: Default::default(),
        }))
    }

    async fn create_folder(&self, path: &str) -> anyhow::Result<()> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Ok(());
        }
        self.ensure_parents(&format!("{path}/x")).await;
        Ok(())
    }

    async fn rename(&self, source: &str, destination: &str) -> anyhow::Result<()> {
        let source = normalize_path(source);
        let destination = normalize_path(destination);
        self.ensure_parents(&destination).await;

        let mut objects = self.objects.lock().await;
        let object = objects
            .remove(&source)
            .ok_or_else(|| CoreError::provider(format!("no object at '{source}'")))?;
        objects.insert(destination, object);
        Ok(())
    }

    async fn quota(&self) -> anyhow::Result<QuotaInfo> {
        let objects = self.objects.lock().await;
        let used: u64 = objects.values().map(|o| o.content.len() as u64).sum();
        let total = self.quota_total.load(Ordering::Relaxed);
        Ok(QuotaInfo {
            used,
            available: total.saturating_sub(used),
            total,
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_download() {
        let store = MemoryStore::new();
        let mut file = StoreFile::new("docs/a.txt", b"hello".to_vec());
        file.hash = "h1".to_string();
        store.upload(&file).await.unwrap();

        let content = store.download("docs/a.txt").await.unwrap();
        assert_eq!(content.content, b"hello");
        assert_eq!(content.hash, "h1");
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_materializes_parent_folders() {
        let store = MemoryStore::new();
        store
            .upload(&StoreFile::new("a/b/c.txt", b"x".to_vec()))
            .await
            .unwrap();

        let meta = store.metadata("a/b").await.unwrap().unwrap();
        assert!(meta.is_folder);
        let meta = store.metadata("a").await.unwrap().unwrap();
        assert!(meta.is_folder);
    }

    #[tokio::test]
    async fn test_metadata_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.metadata("nope.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.delete("never-existed.txt").await.unwrap();
        store
            .upload(&StoreFile::new("a.txt", b"x".to_vec()))
            .await
            .unwrap();
        store.delete("a.txt").await.unwrap();
        store.delete("a.txt").await.unwrap();
        assert!(store.metadata("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_bumps_version() {
        let store = MemoryStore::new();
        store
            .upload(&StoreFile::new("a.txt", b"v1".to_vec()))
            .await
            .unwrap();
        store
            .upload(&StoreFile::new("a.txt", b"v2".to_vec()))
            .await
            .unwrap();
        let meta = store.metadata("a.txt").await.unwrap().unwrap();
        assert_eq!(meta.version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let store = MemoryStore::new();
        for i in 0..150 {
            store.seed(&format!("bulk/f{i:04}.txt"), b"x", "h").await;
        }

        let first = store.list("bulk", None).await.unwrap();
        assert_eq!(first.entries.len(), LIST_PAGE_SIZE);
        assert!(first.next_token.is_some());

        let second = store
            .list("bulk", first.next_token.as_deref())
            .await
            .unwrap();
        assert_eq!(second.entries.len(), 50);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_rename_moves_object() {
        let store = MemoryStore::new();
        store.seed("old.txt", b"data", "h").await;
        store.rename("old.txt", "dir/new.txt").await.unwrap();

        assert!(store.metadata("old.txt").await.unwrap().is_none());
        let meta = store.metadata("dir/new.txt").await.unwrap().unwrap();
        assert_eq!(meta.hash, "h");
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryStore::new();
        store.fail_next_uploads(1);

        let err = store
            .upload(&StoreFile::new("a.txt", b"x".to_vec()))
            .await
            .unwrap_err();
        let core = err.downcast::<CoreError>().unwrap();
        assert!(core.retryable);

        // Next call succeeds
        store
            .upload(&StoreFile::new("a.txt", b"x".to_vec()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_quota_tracks_usage() {
        let store = MemoryStore::new();
        store.seed("a.txt", &[0u8; 1000], "h").await;
        let quota = store.quota().await.unwrap();
        assert_eq!(quota.used, 1000);
        assert_eq!(quota.total, quota.used + quota.available);
    }

    #[tokio::test]
    async fn test_delete_folder_removes_children() {
        let store = MemoryStore::new();
        store.seed("dir/a.txt", b"x", "h").await;
        store.seed("dir/b.txt", b"y", "h").await;
        store.delete("dir").await.unwrap();
        assert!(store.file_paths().await.is_empty());
    }
}
