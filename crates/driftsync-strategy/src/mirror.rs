//! Mirror synchronization: the remote becomes an exact copy of the local
//! tree
//!
//! Processes changes like one-way sync with `preserve_deleted` forced off,
//! then enumerates the remote and deletes every path absent from the
//! engine-supplied local set.

use std::sync::Arc;

use tracing::{info, warn};

use driftsync_core::domain::{ChangeEvent, ChangeKind, Conflict, Resolution, ResolutionStrategy, Winner};
use driftsync_core::error::CoreError;
use driftsync_core::ports::object_store::ObjectStore;
use driftsync_core::ports::strategy::{
    StrategyConfig, SyncDirection, SyncError, SyncRequest, SyncResult, SyncStrategy,
};

use crate::{remote_path_for, upload_change};

/// Exact-copy sync policy; deletes remote extras
pub struct MirrorStrategy {
    store: Arc<dyn ObjectStore>,
    config: StrategyConfig,
}

impl MirrorStrategy {
    pub fn new(store: Arc<dyn ObjectStore>, config: Option<StrategyConfig>) -> Self {
        let mut config = config.unwrap_or_default();
        // A mirror always propagates deletions
        config.preserve_deleted = false;

        Self { store, config }
    }

    async fn process_change(
        &self,
        request: &SyncRequest,
        change: &ChangeEvent,
        result: &mut SyncResult,
    ) -> anyhow::Result<()> {
        result.files_processed += 1;

        match change.kind {
            ChangeKind::Create | ChangeKind::Modify => {
                let remote_path = remote_path_for(request, &change.path);
                upload_change(
                    self.store.as_ref(),
                    change,
                    remote_path,
                    self.config.max_file_size,
                    result,
                )
                .await
            }
            ChangeKind::Delete => {
                let remote_path = remote_path_for(request, &change.path);
                self.store.delete(&remote_path).await?;
                result.files_deleted += 1;
                Ok(())
            }
            ChangeKind::Rename | ChangeKind::Move => {
                if let Some(old_path) = &change.old_path {
                    let old_remote = remote_path_for(request, old_path);
                    self.store.delete(&old_remote).await?;
                    result.files_deleted += 1;
                }
                let remote_path = remote_path_for(request, &change.path);
                upload_change(
                    self.store.as_ref(),
                    change,
                    remote_path,
                    self.config.max_file_size,
                    result,
                )
                .await
            }
            ChangeKind::Chmod => {
                result.files_skipped += 1;
                Ok(())
            }
        }
    }

    /// Deletes every remote file not present in the request's local set
    async fn cleanup_remote(&self, request: &SyncRequest, result: &mut SyncResult) {
        info!(destination = %request.destination, "Removing remote files absent locally");

        let mut page_token: Option<String> = None;
        let mut extras: Vec<String> = Vec::new();

        loop {
            let page = match self
                .store
                .list(&request.destination, page_token.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Failed to list remote for mirror cleanup");
                    result.record_error(SyncError::new(
                        request.destination.clone(),
                        "list",
                        format!("{e:#}"),
                    ));
                    return;
                }
            };

            for entry in page.entries {
                if entry.is_folder {
                    continue;
                }
                if !request.local_paths.contains(&entry.path) {
                    extras.push(entry.path);
                }
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        for path in extras {
            match self.store.delete(&path).await {
                Ok(()) => {
                    result.files_deleted += 1;
                    tracing::debug!(path = %path, "Deleted remote extra");
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to delete remote extra");
                    result.record_error(SyncError::new(path, "delete", format!("{e:#}")));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl SyncStrategy for MirrorStrategy {
    fn name(&self) -> &'static str {
        "mirror"
    }

    async fn sync(&self, request: &SyncRequest) -> anyhow::Result<SyncResult> {
        info!(
            source = %request.source_root.display(),
            destination = %request.destination,
            changes = request.changes.len(),
            local_paths = request.local_paths.len(),
            "Starting mirror sync"
        );

        let mut result = SyncResult::started();

        for change in &request.changes {
            if let Err(e) = self.process_change(request, change, &mut result).await {
                warn!(
                    path = %change.path.display(),
                    kind = %change.kind,
                    error = %e,
                    "Failed to process change"
                );
                result.record_error(SyncError::new(
                    change.path.to_string_lossy(),
                    change.kind.as_str(),
                    format!("{e:#}"),
                ));
            }
        }

        self.cleanup_remote(request, &mut result).await;

        result.finish();

        info!(
            processed = result.files_processed,
            uploaded = result.files_uploaded,
            deleted = result.files_deleted,
            skipped = result.files_skipped,
            bytes = result.bytes_transferred,
            success = result.success,
            "Mirror sync completed"
        );

        Ok(result)
    }

    async fn resolve_conflict(&self, conflict: &Conflict) -> anyhow::Result<Resolution> {
        // The local tree is the source of truth in a mirror
        let mut resolution = Resolution::new(ResolutionStrategy::KeepLocal);
        resolution.winner = Some(Winner::Local);

        tracing::debug!(
            path = %conflict.path,
            kind = %conflict.kind,
            "Conflict resolved, local wins"
        );
        Ok(resolution)
    }

    fn validate(&self, request: &SyncRequest) -> Result<(), CoreError> {
        if request.source_root.as_os_str().is_empty() {
            return Err(CoreError::validation("source path is required"));
        }
        Ok(())
    }

    fn direction(&self) -> SyncDirection {
        SyncDirection::Mirror
    }

    fn supports_resume(&self) -> bool {
        true
    }

    fn configuration(&self) -> &StrategyConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use driftsync_core::ports::memory::MemoryStore;

    #[tokio::test]
    async fn test_preserve_deleted_is_forced_off() {
        let store = Arc::new(MemoryStore::new());
        let config = StrategyConfig {
            preserve_deleted: true,
            ..Default::default()
        };
        let strategy = MirrorStrategy::new(store as Arc<dyn ObjectStore>, Some(config));
        assert!(!strategy.configuration().preserve_deleted);
    }

    #[tokio::test]
    async fn test_remote_extras_deleted() {
        let store = Arc::new(MemoryStore::new());
        store.seed("p.txt", b"keep", "h1").await;
        store.seed("q.txt", b"extra", "h2").await;

        let strategy = MirrorStrategy::new(store.clone() as Arc<dyn ObjectStore>, None);
        let dir = tempfile::tempdir().unwrap();

        // No events this cycle: only the enumeration runs. The local tree
        // contains p.txt only.
        let mut request = SyncRequest::new(dir.path(), "");
        request.local_paths.insert("p.txt".to_string());

        let result = strategy.sync(&request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.files_deleted, 1);
        assert!(store.metadata("p.txt").await.unwrap().is_some());
        assert!(store.metadata("q.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_paginates_past_one_page() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..130 {
            store.seed(&format!("bulk/f{i:04}.txt"), b"x", "h").await;
        }

        let strategy = MirrorStrategy::new(store.clone() as Arc<dyn ObjectStore>, None);
        let dir = tempfile::tempdir().unwrap();

        // Keep only the first ten files
        let mut request = SyncRequest::new(dir.path(), "");
        for i in 0..10 {
            request.local_paths.insert(format!("bulk/f{i:04}.txt"));
        }

        let result = strategy.sync(&request).await.unwrap();
        assert_eq!(result.files_deleted, 120);
        assert_eq!(store.file_paths().await.len(), 10);
    }

    #[tokio::test]
    async fn test_uploads_and_cleanup_in_one_run() {
        let store = Arc::new(MemoryStore::new());
        store.seed("stale.txt", b"old", "h").await;

        let strategy = MirrorStrategy::new(store.clone() as Arc<dyn ObjectStore>, None);
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh.txt");
        tokio::fs::write(&fresh, b"new").await.unwrap();

        let mut event = ChangeEvent::new(ChangeKind::Create, &fresh);
        event.size = 3;
        let mut request = SyncRequest::new(dir.path(), "");
        request.changes.push(event);
        request.local_paths.insert("fresh.txt".to_string());

        let result = strategy.sync(&request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.files_uploaded, 1);
        assert_eq!(result.files_deleted, 1);
        assert!(store.metadata("fresh.txt").await.unwrap().is_some());
        assert!(store.metadata("stale.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_failure_recorded_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.seed("extra.txt", b"x", "h").await;
        store.fail_next_deletes(1);

        let strategy = MirrorStrategy::new(store.clone() as Arc<dyn ObjectStore>, None);
        let dir = tempfile::tempdir().unwrap();
        let request = SyncRequest::new(dir.path(), "");

        let result = strategy.sync(&request).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].operation, "delete");
    }
}
