//! One-way synchronization: local is authoritative, remote follows
//!
//! Creates and modifications upload; deletions propagate unless
//! `preserve_deleted` is set; renames become delete-old plus upload-new.
//! Conflicts always resolve in favor of the local side.

use std::sync::Arc;

use tracing::{info, warn};

use driftsync_core::domain::{ChangeEvent, ChangeKind, Conflict, Resolution, ResolutionStrategy, Winner};
use driftsync_core::error::CoreError;
use driftsync_core::ports::object_store::ObjectStore;
use driftsync_core::ports::strategy::{
    StrategyConfig, SyncDirection, SyncError, SyncRequest, SyncResult, SyncStrategy,
};

use crate::{remote_path_for, upload_change};

/// Local-to-remote one-way sync policy
pub struct OneWayStrategy {
    store: Arc<dyn ObjectStore>,
    config: StrategyConfig,
}

impl OneWayStrategy {
    pub fn new(store: Arc<dyn ObjectStore>, config: Option<StrategyConfig>) -> Self {
        Self {
            store,
            config: config.unwrap_or_default(),
        }
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
                if self.config.preserve_deleted {
                    result.files_skipped += 1;
                    return Ok(());
                }
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
                // Permission-only changes have no remote counterpart here
                result.files_skipped += 1;
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl SyncStrategy for OneWayStrategy {
    fn name(&self) -> &'static str {
        "one_way"
    }

    async fn sync(&self, request: &SyncRequest) -> anyhow::Result<SyncResult> {
        info!(
            source = %request.source_root.display(),
            destination = %request.destination,
            changes = request.changes.len(),
            "Starting one-way sync"
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

        result.finish();

        info!(
            processed = result.files_processed,
            uploaded = result.files_uploaded,
            deleted = result.files_deleted,
            skipped = result.files_skipped,
            bytes = result.bytes_transferred,
            success = result.success,
            "One-way sync completed"
        );

        Ok(result)
    }

    async fn resolve_conflict(&self, conflict: &Conflict) -> anyhow::Result<Resolution> {
        // Local always wins in one-way sync
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
        SyncDirection::OneWay
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
    use std::path::Path;

    use driftsync_core::ports::memory::MemoryStore;

    fn change(kind: ChangeKind, path: &Path, size: u64) -> ChangeEvent {
        let mut event = ChangeEvent::new(kind, path);
        event.size = size;
        event
    }

    async fn setup() -> (Arc<MemoryStore>, OneWayStrategy, tempfile::TempDir) {
        let store = Arc::new(MemoryStore::new());
        let strategy = OneWayStrategy::new(store.clone() as Arc<dyn ObjectStore>, None);
        let dir = tempfile::tempdir().unwrap();
        (store, strategy, dir)
    }

    #[tokio::test]
    async fn test_create_uploads() {
        let (store, strategy, dir) = setup().await;
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, b"v1").await.unwrap();

        let mut request = SyncRequest::new(dir.path(), "");
        request.changes.push(change(ChangeKind::Create, &file, 2));

        let result = strategy.sync(&request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.files_uploaded, 1);
        assert_eq!(result.bytes_transferred, 2);
        assert_eq!(store.upload_count(), 1);
        assert!(store.metadata("a.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_propagates() {
        let (store, strategy, dir) = setup().await;
        store.seed("gone.txt", b"x", "h").await;

        let mut request = SyncRequest::new(dir.path(), "");
        request.changes.push(change(
            ChangeKind::Delete,
            &dir.path().join("gone.txt"),
            0,
        ));

        let result = strategy.sync(&request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.files_deleted, 1);
        assert!(store.metadata("gone.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_of_missing_remote_is_success() {
        let (_store, strategy, dir) = setup().await;

        let mut request = SyncRequest::new(dir.path(), "");
        request.changes.push(change(
            ChangeKind::Delete,
            &dir.path().join("never-uploaded.txt"),
            0,
        ));

        let result = strategy.sync(&request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.files_deleted, 1);
    }

    #[tokio::test]
    async fn test_preserve_deleted_skips() {
        let store = Arc::new(MemoryStore::new());
        store.seed("kept.txt", b"x", "h").await;
        let config = StrategyConfig {
            preserve_deleted: true,
            ..Default::default()
        };
        let strategy = OneWayStrategy::new(store.clone() as Arc<dyn ObjectStore>, Some(config));
        let dir = tempfile::tempdir().unwrap();

        let mut request = SyncRequest::new(dir.path(), "");
        request.changes.push(change(
            ChangeKind::Delete,
            &dir.path().join("kept.txt"),
            0,
        ));

        let result = strategy.sync(&request).await.unwrap();
        assert_eq!(result.files_skipped, 1);
        assert_eq!(result.files_deleted, 0);
        assert!(store.metadata("kept.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rename_deletes_old_uploads_new() {
        let (store, strategy, dir) = setup().await;
        store.seed("old.txt", b"x", "h").await;
        let new_file = dir.path().join("new.txt");
        tokio::fs::write(&new_file, b"renamed").await.unwrap();

        let mut event = change(ChangeKind::Rename, &new_file, 7);
        event.old_path = Some(dir.path().join("old.txt"));
        let mut request = SyncRequest::new(dir.path(), "");
        request.changes.push(event);

        let result = strategy.sync(&request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.files_deleted, 1);
        assert_eq!(result.files_uploaded, 1);
        assert!(store.metadata("old.txt").await.unwrap().is_none());
        assert!(store.metadata("new.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_oversized_file_skipped() {
        let store = Arc::new(MemoryStore::new());
        let config = StrategyConfig {
            max_file_size: 10,
            ..Default::default()
        };
        let strategy = OneWayStrategy::new(store.clone() as Arc<dyn ObjectStore>, Some(config));
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.bin");
        tokio::fs::write(&file, vec![0u8; 100]).await.unwrap();

        let mut request = SyncRequest::new(dir.path(), "");
        request.changes.push(change(ChangeKind::Create, &file, 100));

        let result = strategy.sync(&request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.files_skipped, 1);
        assert_eq!(result.files_uploaded, 0);
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_single_failure_does_not_abort_batch() {
        let (store, strategy, dir) = setup().await;
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        tokio::fs::write(&first, b"1").await.unwrap();
        tokio::fs::write(&second, b"2").await.unwrap();

        store.fail_next_uploads(1);

        let mut request = SyncRequest::new(dir.path(), "");
        request.changes.push(change(ChangeKind::Create, &first, 1));
        request.changes.push(change(ChangeKind::Create, &second, 1));

        let result = strategy.sync(&request).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.files_uploaded, 1);
        assert_eq!(result.files_processed, 2);
    }

    #[tokio::test]
    async fn test_conflict_resolves_local() {
        let (_store, strategy, _dir) = setup().await;
        let local = driftsync_core::domain::ConflictFile {
            path: "/a".to_string(),
            hash: "x".to_string(),
            size: 1,
            modified: None,
        };
        let remote = local.clone();
        let conflict = Conflict::new(
            "/a",
            driftsync_core::domain::ConflictKind::BothModified,
            local,
            remote,
        );

        let resolution = strategy.resolve_conflict(&conflict).await.unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::KeepLocal);
        assert_eq!(resolution.winner, Some(Winner::Local));
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_source() {
        let (_store, strategy, _dir) = setup().await;
        let request = SyncRequest::new("", "");
        assert!(strategy.validate(&request).is_err());
    }
}
