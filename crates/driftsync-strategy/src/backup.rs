//! Backup synchronization: every version is preserved, nothing is ever
//! deleted remotely
//!
//! Uploads go to versioned paths when the target already exists;
//! deletions and renames leave zero-byte marker files behind instead of
//! removing anything.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use driftsync_core::domain::{ChangeEvent, ChangeKind, Conflict, Resolution, ResolutionStrategy};
use driftsync_core::error::CoreError;
use driftsync_core::ports::object_store::{ObjectStore, StoreFile};
use driftsync_core::ports::strategy::{
    StrategyConfig, SyncDirection, SyncError, SyncRequest, SyncResult, SyncStrategy,
};

use crate::{remote_path_for, upload_change, versioned_remote_path, VERSION_TIMESTAMP};

/// Versioning, never-delete sync policy
pub struct BackupStrategy {
    store: Arc<dyn ObjectStore>,
    config: StrategyConfig,
}

impl BackupStrategy {
    pub fn new(store: Arc<dyn ObjectStore>, config: Option<StrategyConfig>) -> Self {
        let mut config = config.unwrap_or_else(|| StrategyConfig {
            conflict_resolution: ResolutionStrategy::KeepBoth,
            ..Default::default()
        });
        // Backups keep everything
        config.preserve_deleted = true;
        config.version_control = true;

        Self { store, config }
    }

    async fn process_change(
        &self,
        request: &SyncRequest,
        change: &ChangeEvent,
        session_timestamp: &str,
        result: &mut SyncResult,
    ) -> anyhow::Result<()> {
        result.files_processed += 1;

        match change.kind {
            ChangeKind::Create | ChangeKind::Modify => {
                self.backup_file(request, change, session_timestamp, result)
                    .await
            }
            ChangeKind::Delete => {
                // Mark, never remove
                let remote_path = remote_path_for(request, &change.path);
                let marker = format!("{remote_path}.deleted_{session_timestamp}");
                self.upload_marker(&marker, result).await;
                Ok(())
            }
            ChangeKind::Rename | ChangeKind::Move => {
                if let Some(old_path) = &change.old_path {
                    let old_remote = remote_path_for(request, old_path);
                    let marker = format!("{old_remote}.moved_{session_timestamp}");
                    self.upload_marker(&marker, result).await;
                }
                self.backup_file(request, change, session_timestamp, result)
                    .await
            }
            ChangeKind::Chmod => {
                result.files_skipped += 1;
                Ok(())
            }
        }
    }

    /// Uploads the file, diverting to a versioned path when the remote
    /// target already exists
    async fn backup_file(
        &self,
        request: &SyncRequest,
        change: &ChangeEvent,
        session_timestamp: &str,
        result: &mut SyncResult,
    ) -> anyhow::Result<()> {
        let mut remote_path = remote_path_for(request, &change.path);

        if self.config.version_control && !change.is_directory {
            if self.store.metadata(&remote_path).await?.is_some() {
                let versioned = versioned_remote_path(&remote_path, session_timestamp);
                debug!(
                    original = %remote_path,
                    versioned = %versioned,
                    "Remote target exists, writing versioned backup"
                );
                remote_path = versioned;
            }
        }

        upload_change(
            self.store.as_ref(),
            change,
            remote_path,
            self.config.max_file_size,
            result,
        )
        .await
    }

    /// Uploads a zero-byte marker; a failure is recorded without
    /// aborting the batch
    async fn upload_marker(&self, path: &str, result: &mut SyncResult) {
        match self.store.upload(&StoreFile::marker(path)).await {
            Ok(()) => {
                debug!(marker = %path, "Marker uploaded");
                result.files_uploaded += 1;
            }
            Err(e) => {
                warn!(marker = %path, error = %e, "Failed to upload marker");
                result.record_error(SyncError::new(path, "marker", format!("{e:#}")));
            }
        }
    }
}

#[async_trait::async_trait]
impl SyncStrategy for BackupStrategy {
    fn name(&self) -> &'static str {
        "backup"
    }

    async fn sync(&self, request: &SyncRequest) -> anyhow::Result<SyncResult> {
        // One timestamp per run so all versions from a session line up
        let session_timestamp = Utc::now().format(VERSION_TIMESTAMP).to_string();

        info!(
            source = %request.source_root.display(),
            destination = %request.destination,
            changes = request.changes.len(),
            session = %session_timestamp,
            "Starting backup sync"
        );

        let mut result = SyncResult::started();

        for change in &request.changes {
            if let Err(e) = self
                .process_change(request, change, &session_timestamp, &mut result)
                .await
            {
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
            skipped = result.files_skipped,
            bytes = result.bytes_transferred,
            success = result.success,
            "Backup sync completed"
        );

        Ok(result)
    }

    async fn resolve_conflict(&self, conflict: &Conflict) -> anyhow::Result<Resolution> {
        // Both versions survive; the local copy goes to a versioned path
        let timestamp = Utc::now().format(VERSION_TIMESTAMP).to_string();
        let mut resolution = Resolution::new(ResolutionStrategy::KeepBoth);
        resolution.resolved_path = Some(versioned_remote_path(&conflict.path, &timestamp));

        tracing::debug!(
            path = %conflict.path,
            versioned = resolution.resolved_path.as_deref().unwrap_or(""),
            "Conflict resolved, keeping both versions"
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
        SyncDirection::Backup
    }

    fn supports_resume(&self) -> bool {
        true
    }

    fn configuration(&self) -> &StrategyConfig {
        &self.config
    }
}
