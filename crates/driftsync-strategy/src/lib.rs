//! driftsync sync strategies
//!
//! Three policies over the object-store port, all sharing the same shape:
//! dispatch each change event to upload / delete / rename handling, record
//! single-file failures without aborting the batch, and report a
//! [`SyncResult`] whose success reflects the absence of errors and
//! conflicts.
//!
//! - [`OneWayStrategy`]: local wins, deletes propagate (unless preserved)
//! - [`MirrorStrategy`]: one-way plus deletion of remote extras
//! - [`BackupStrategy`]: versioned uploads, markers instead of deletes
//!
//! [`SyncResult`]: driftsync_core::ports::SyncResult

mod backup;
mod mirror;
mod oneway;

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::debug;

use driftsync_core::domain::ChangeEvent;
use driftsync_core::ports::object_store::{ObjectStore, StoreFile};
use driftsync_core::ports::strategy::{SyncRequest, SyncResult};

pub use backup::BackupStrategy;
pub use mirror::MirrorStrategy;
pub use oneway::OneWayStrategy;

/// Timestamp format shared by versioned paths and markers
pub(crate) const VERSION_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// Maps a local path onto its remote POSIX path under the request's
/// destination
pub(crate) fn remote_path_for(request: &SyncRequest, local: &Path) -> String {
    request.remote_path_for(local)
}

/// `<dir>/<stem>_v<YYYYMMDD_HHMMSS><ext>` for a remote path
pub(crate) fn versioned_remote_path(path: &str, timestamp: &str) -> String {
    let (dir, base) = match path.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, path),
    };
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (base, String::new()),
    };

    let name = format!("{stem}_v{timestamp}{ext}");
    match dir {
        Some(dir) => format!("{dir}/{name}"),
        None => name,
    }
}

/// Uploads the local file behind a change event to `remote_path`
///
/// Directories become remote folders. Files over `max_file_size` are
/// counted as skipped, not errors.
pub(crate) async fn upload_change(
    store: &dyn ObjectStore,
    change: &ChangeEvent,
    remote_path: String,
    max_file_size: u64,
    result: &mut SyncResult,
) -> anyhow::Result<()> {
    if max_file_size > 0 && change.size > max_file_size {
        debug!(
            path = %change.path.display(),
            size = change.size,
            limit = max_file_size,
            "File exceeds size limit, skipping"
        );
        result.files_skipped += 1;
        return Ok(());
    }

    if change.is_directory {
        store
            .create_folder(&remote_path)
            .await
            .with_context(|| format!("failed to create remote folder {remote_path}"))?;
        return Ok(());
    }

    let content = tokio::fs::read(&change.path)
        .await
        .with_context(|| format!("failed to read local file {}", change.path.display()))?;

    let mut file = StoreFile::new(remote_path, content);
    file.hash = change.hash.clone();
    file.modified = DateTime::<Utc>::from_timestamp(change.timestamp, 0);

    store
        .upload(&file)
        .await
        .with_context(|| format!("failed to upload {}", file.path))?;

    result.files_uploaded += 1;
    result.bytes_transferred += file.size;

    debug!(path = %file.path, size = file.size, "File uploaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_remote_path_for_plain_destination() {
        let mut request = SyncRequest::new("/home/u/data", "");
        request.destination = String::new();
        assert_eq!(
            remote_path_for(&request, &PathBuf::from("/home/u/data/docs/a.txt")),
            "docs/a.txt"
        );
    }

    #[test]
    fn test_remote_path_for_prefixed_destination() {
        let request = SyncRequest::new("/home/u/data", "backups/laptop");
        assert_eq!(
            remote_path_for(&request, &PathBuf::from("/home/u/data/a.txt")),
            "backups/laptop/a.txt"
        );
    }

    #[test]
    fn test_remote_path_outside_root_falls_back() {
        let request = SyncRequest::new("/home/u/data", "");
        assert_eq!(
            remote_path_for(&request, &PathBuf::from("/elsewhere/b.txt")),
            "elsewhere/b.txt"
        );
    }

    #[test]
    fn test_versioned_remote_path() {
        assert_eq!(
            versioned_remote_path("docs/r.txt", "20250101_120000"),
            "docs/r_v20250101_120000.txt"
        );
        assert_eq!(
            versioned_remote_path("r.txt", "20250101_120000"),
            "r_v20250101_120000.txt"
        );
        assert_eq!(
            versioned_remote_path("docs/noext", "20250101_120000"),
            "docs/noext_v20250101_120000"
        );
        // Hidden files keep their whole name as the stem
        assert_eq!(
            versioned_remote_path(".env", "20250101_120000"),
            ".env_v20250101_120000"
        );
    }
}
