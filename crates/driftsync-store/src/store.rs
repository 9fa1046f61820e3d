//! SQLite bucket store
//!
//! Each bucket is a `(key TEXT PRIMARY KEY, value TEXT)` table named
//! `kv_<bucket>`. Upserts use `ON CONFLICT ... DO UPDATE` so a row keeps
//! its rowid, which preserves insertion order for the reverse cursor over
//! `transactions`.
//!
//! Export and compaction snapshot the live database with `VACUUM INTO`,
//! which is consistent under concurrent readers; compaction then swaps the
//! snapshot into place atomically and reopens the pool.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use driftsync_core::domain::{ChangeEvent, Conflict, FileState, FileSyncStatus, SyncState, SyncTransaction};

/// All buckets, created at open
pub const BUCKETS: &[&str] = &[
    "state",
    "file_state",
    "transactions",
    "queue",
    "conflicts",
    "history",
    "config",
    "events",
    "metadata",
];

const BUCKET_STATE: &str = "state";
const BUCKET_FILE_STATE: &str = "file_state";
const BUCKET_TRANSACTIONS: &str = "transactions";
const BUCKET_QUEUE: &str = "queue";
const BUCKET_CONFLICTS: &str = "conflicts";

/// Key of the singleton sync state in the `state` bucket
const STATE_KEY_CURRENT: &str = "current";

/// State store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown bucket '{0}'")]
    UnknownBucket(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation not supported for in-memory store: {0}")]
    Unsupported(&'static str),
}

/// Aggregate statistics computed over the persisted state
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncStatistics {
    pub total_files: u64,
    pub total_synced: u64,
    pub total_pending: u64,
    pub total_error: u64,
    pub total_bytes: u64,
    pub synced_bytes: u64,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub is_running: bool,
}

/// SQLite-backed bucket store
pub struct StateStore {
    /// Database file path; `None` for in-memory stores
    path: Option<PathBuf>,
    pool: RwLock<SqlitePool>,
}

/// Returns the table name for a bucket, validating the bucket name
fn table(bucket: &str) -> Result<String, StoreError> {
    if BUCKETS.contains(&bucket) {
        Ok(format!("kv_{bucket}"))
    } else {
        Err(StoreError::UnknownBucket(bucket.to_string()))
    }
}

async fn create_buckets(pool: &SqlitePool) -> Result<(), StoreError> {
    for bucket in BUCKETS {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS kv_{bucket} (key TEXT PRIMARY KEY, value TEXT NOT NULL)"
        );
        sqlx::query(&sql).execute(pool).await?;
    }
    Ok(())
}

async fn open_pool(path: &Path) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))
}

impl StateStore {
    /// Opens (or creates) the store at the given file path
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = open_pool(path).await?;
        create_buckets(&pool).await?;

        info!(path = %path.display(), "State store opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            pool: RwLock::new(pool),
        })
    }

    /// Opens an in-memory store for testing
    ///
    /// Uses a single connection so the data survives across queries.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Connection(format!("in-memory: {e}")))?;
        create_buckets(&pool).await?;

        debug!("In-memory state store opened");
        Ok(Self {
            path: None,
            pool: RwLock::new(pool),
        })
    }

    // ------------------------------------------------------------------
    // Generic bucket operations
    // ------------------------------------------------------------------

    /// Stores a JSON value under `bucket/key`
    pub async fn put<T: Serialize>(
        &self,
        bucket: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let table = table(bucket)?;
        let json = serde_json::to_string(value)?;
        let pool = self.pool.read().await;
        let sql = format!(
            "INSERT INTO {table} (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value"
        );
        sqlx::query(&sql).bind(key).bind(json).execute(&*pool).await?;
        Ok(())
    }

    /// Fetches and decodes a value; `Ok(None)` when the key is absent
    pub async fn get<T: DeserializeOwned>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let table = table(bucket)?;
        let pool = self.pool.read().await;
        let sql = format!("SELECT value FROM {table} WHERE key = ?1");
        let row = sqlx::query(&sql).bind(key).fetch_optional(&*pool).await?;
        match row {
            Some(row) => {
                let json: String = row.get("value");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Removes a key; missing keys are not an error
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let table = table(bucket)?;
        let pool = self.pool.read().await;
        let sql = format!("DELETE FROM {table} WHERE key = ?1");
        sqlx::query(&sql).bind(key).execute(&*pool).await?;
        Ok(())
    }

    /// Lists all keys in a bucket in ascending order
    pub async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        let table = table(bucket)?;
        let pool = self.pool.read().await;
        let sql = format!("SELECT key FROM {table} ORDER BY key");
        let rows = sqlx::query(&sql).fetch_all(&*pool).await?;
        Ok(rows.iter().map(|r| r.get("key")).collect())
    }

    /// Lists keys with a given prefix in ascending order
    pub async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let table = table(bucket)?;
        let pool = self.pool.read().await;
        let sql = format!("SELECT key FROM {table} WHERE key >= ?1 AND key < ?2 ORDER BY key");
        // Upper bound: prefix with the last byte incremented
        let mut upper = prefix.as_bytes().to_vec();
        match upper.last_mut() {
            Some(last) if *last < 0xff => *last += 1,
            _ => upper.push(0xff),
        }
        let upper = String::from_utf8_lossy(&upper).into_owned();
        let rows = sqlx::query(&sql)
            .bind(prefix)
            .bind(upper)
            .fetch_all(&*pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("key")).collect())
    }

    /// Number of entries in a bucket
    pub async fn count(&self, bucket: &str) -> Result<u64, StoreError> {
        let table = table(bucket)?;
        let pool = self.pool.read().await;
        let sql = format!("SELECT COUNT(*) AS n FROM {table}");
        let row = sqlx::query(&sql).fetch_one(&*pool).await?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    /// Removes all entries from a bucket
    pub async fn clear(&self, bucket: &str) -> Result<(), StoreError> {
        let table = table(bucket)?;
        let pool = self.pool.read().await;
        let sql = format!("DELETE FROM {table}");
        sqlx::query(&sql).execute(&*pool).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sync state
    // ------------------------------------------------------------------

    pub async fn save_sync_state(&self, state: &SyncState) -> Result<(), StoreError> {
        self.put(BUCKET_STATE, STATE_KEY_CURRENT, state).await
    }

    /// Loads the singleton sync state, or a fresh one if never saved
    pub async fn load_sync_state(&self) -> Result<SyncState, StoreError> {
        Ok(self
            .get(BUCKET_STATE, STATE_KEY_CURRENT)
            .await?
            .unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // File state
    // ------------------------------------------------------------------

    pub async fn upsert_file_state(&self, state: &FileState) -> Result<(), StoreError> {
        self.put(BUCKET_FILE_STATE, &state.path, state).await
    }

    pub async fn get_file_state(&self, path: &str) -> Result<Option<FileState>, StoreError> {
        self.get(BUCKET_FILE_STATE, path).await
    }

    pub async fn delete_file_state(&self, path: &str) -> Result<(), StoreError> {
        self.delete(BUCKET_FILE_STATE, path).await
    }

    /// Cursor-iterated list of all file states, ordered by path
    pub async fn list_file_states(&self) -> Result<Vec<FileState>, StoreError> {
        let pool = self.pool.read().await;
        let rows = sqlx::query("SELECT value FROM kv_file_state ORDER BY key")
            .fetch_all(&*pool)
            .await?;
        let mut states = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.get("value");
            match serde_json::from_str(&json) {
                Ok(state) => states.push(state),
                Err(e) => warn!(error = %e, "Dropping malformed file state row"),
            }
        }
        Ok(states)
    }

    pub async fn list_file_states_by_status(
        &self,
        status: FileSyncStatus,
    ) -> Result<Vec<FileState>, StoreError> {
        Ok(self
            .list_file_states()
            .await?
            .into_iter()
            .filter(|s| s.status == status)
            .collect())
    }

    /// Updates the status of one file, creating the state if absent
    pub async fn update_file_status(
        &self,
        path: &str,
        status: FileSyncStatus,
    ) -> Result<(), StoreError> {
        let mut state = self
            .get_file_state(path)
            .await?
            .unwrap_or_else(|| FileState::new(path));
        state.status = status;
        state.last_check_time = Some(Utc::now());
        if status == FileSyncStatus::Synced {
            state.last_sync_time = Some(Utc::now());
            state.reset_retry();
        }
        self.upsert_file_state(&state).await
    }

    pub async fn increment_file_retry(&self, path: &str) -> Result<(), StoreError> {
        let mut state = self
            .get_file_state(path)
            .await?
            .unwrap_or_else(|| FileState::new(path));
        state.increment_retry();
        self.upsert_file_state(&state).await
    }

    pub async fn set_file_conflict(&self, path: &str, kind: &str) -> Result<(), StoreError> {
        let mut state = self
            .get_file_state(path)
            .await?
            .unwrap_or_else(|| FileState::new(path));
        state.set_conflict(kind);
        self.upsert_file_state(&state).await
    }

    pub async fn resolve_file_conflict(&self, path: &str) -> Result<(), StoreError> {
        let Some(mut state) = self.get_file_state(path).await? else {
            return Ok(());
        };
        state.resolve_conflict();
        self.upsert_file_state(&state).await
    }

    /// Saves multiple file states inside one transaction
    pub async fn batch_upsert_file_states(&self, states: &[FileState]) -> Result<(), StoreError> {
        let pool = self.pool.read().await;
        let mut tx = pool.begin().await?;
        for state in states {
            let json = serde_json::to_string(state)?;
            sqlx::query(
                "INSERT INTO kv_file_state (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(&state.path)
            .bind(json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub async fn save_transaction(&self, txn: &SyncTransaction) -> Result<(), StoreError> {
        self.put(BUCKET_TRANSACTIONS, &txn.id, txn).await
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Option<SyncTransaction>, StoreError> {
        self.get(BUCKET_TRANSACTIONS, id).await
    }

    /// Lists transactions newest-first, skipping `offset` and returning at
    /// most `limit`
    pub async fn list_transactions(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SyncTransaction>, StoreError> {
        let pool = self.pool.read().await;
        let rows = sqlx::query(
            "SELECT value FROM kv_transactions ORDER BY rowid DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&*pool)
        .await?;

        let mut txns = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.get("value");
            match serde_json::from_str(&json) {
                Ok(txn) => txns.push(txn),
                Err(e) => warn!(error = %e, "Dropping malformed transaction row"),
            }
        }
        Ok(txns)
    }

    /// Deletes transactions whose end time predates `before`
    pub async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let pool = self.pool.read().await;
        let mut tx = pool.begin().await?;
        let rows = sqlx::query("SELECT key, value FROM kv_transactions")
            .fetch_all(&mut *tx)
            .await?;

        let mut removed = 0u64;
        for row in rows {
            let key: String = row.get("key");
            let json: String = row.get("value");
            let Ok(txn) = serde_json::from_str::<SyncTransaction>(&json) else {
                continue;
            };
            if matches!(txn.end_time, Some(end) if end < before) {
                sqlx::query("DELETE FROM kv_transactions WHERE key = ?1")
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
                removed += 1;
            }
        }
        tx.commit().await?;

        if removed > 0 {
            info!(removed, before = %before, "Transaction history cleaned up");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Conflicts
    // ------------------------------------------------------------------

    pub async fn save_conflict(&self, conflict: &Conflict) -> Result<(), StoreError> {
        self.put(BUCKET_CONFLICTS, &conflict.id, conflict).await
    }

    pub async fn get_conflict(&self, id: &str) -> Result<Option<Conflict>, StoreError> {
        self.get(BUCKET_CONFLICTS, id).await
    }

    pub async fn list_conflicts(&self) -> Result<Vec<Conflict>, StoreError> {
        let pool = self.pool.read().await;
        let rows = sqlx::query("SELECT value FROM kv_conflicts ORDER BY key")
            .fetch_all(&*pool)
            .await?;
        let mut conflicts = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.get("value");
            match serde_json::from_str(&json) {
                Ok(conflict) => conflicts.push(conflict),
                Err(e) => warn!(error = %e, "Dropping malformed conflict row"),
            }
        }
        Ok(conflicts)
    }

    // ------------------------------------------------------------------
    // Queue mirror
    // ------------------------------------------------------------------

    /// Rewrites the `queue` bucket with the full pending set, in one
    /// transaction
    pub async fn replace_queue(&self, events: &[ChangeEvent]) -> Result<(), StoreError> {
        let pool = self.pool.read().await;
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM kv_queue").execute(&mut *tx).await?;
        for event in events {
            let key = event.path.to_string_lossy();
            let json = serde_json::to_string(event)?;
            sqlx::query("INSERT INTO kv_queue (key, value) VALUES (?1, ?2)")
                .bind(key.as_ref())
                .bind(json)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Loads the mirrored pending set, dropping malformed entries with a
    /// warning
    pub async fn load_queue(&self) -> Result<Vec<ChangeEvent>, StoreError> {
        let pool = self.pool.read().await;
        let rows = sqlx::query("SELECT value FROM kv_queue ORDER BY key")
            .fetch_all(&*pool)
            .await?;
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.get("value");
            match serde_json::from_str(&json) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "Dropping malformed queued event"),
            }
        }
        Ok(events)
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Computes aggregate statistics over file states and the sync state
    pub async fn statistics(&self) -> Result<SyncStatistics, StoreError> {
        let state = self.load_sync_state().await?;
        let file_states = self.list_file_states().await?;

        let mut stats = SyncStatistics {
            total_files: file_states.len() as u64,
            total_synced: 0,
            total_pending: 0,
            total_error: 0,
            total_bytes: 0,
            synced_bytes: 0,
            last_sync_time: state.last_sync_time,
            last_success_time: state.last_success_time,
            is_running: state.is_running,
        };

        for fs in &file_states {
            stats.total_bytes += fs.local_size;
            match fs.status {
                FileSyncStatus::Synced => {
                    stats.total_synced += 1;
                    stats.synced_bytes += fs.local_size;
                }
                FileSyncStatus::Pending => stats.total_pending += 1,
                FileSyncStatus::Error => stats.total_error += 1,
                _ => {}
            }
        }

        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Drops and recreates every bucket
    pub async fn reset(&self) -> Result<(), StoreError> {
        let pool = self.pool.read().await;
        let mut tx = pool.begin().await?;
        for bucket in BUCKETS {
            let drop_sql = format!("DROP TABLE IF EXISTS kv_{bucket}");
            sqlx::query(&drop_sql).execute(&mut *tx).await?;
            let create_sql = format!(
                "CREATE TABLE kv_{bucket} (key TEXT PRIMARY KEY, value TEXT NOT NULL)"
            );
            sqlx::query(&create_sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("State store reset");
        Ok(())
    }

    /// Writes a consistent snapshot of the database to `target`
    pub async fn export(&self, target: &Path) -> Result<(), StoreError> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Remove a stale snapshot; VACUUM INTO refuses to overwrite
        if target.exists() {
            std::fs::remove_file(target)?;
        }

        let pool = self.pool.read().await;
        let escaped = target.to_string_lossy().replace('\'', "''");
        let sql = format!("VACUUM INTO '{escaped}'");
        sqlx::query(&sql).execute(&*pool).await?;

        info!(target = %target.display(), "State store exported");
        Ok(())
    }

    /// Replaces the database file with `source`: close, copy, reopen
    pub async fn import(&self, source: &Path) -> Result<(), StoreError> {
        let Some(path) = self.path.clone() else {
            return Err(StoreError::Unsupported("import"));
        };

        let mut pool = self.pool.write().await;
        pool.close().await;

        // Drop WAL sidecar files left by the previous instance
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = path.as_os_str().to_owned();
            sidecar.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(sidecar));
        }
        std::fs::copy(source, &path)?;

        let reopened = open_pool(&path).await?;
        create_buckets(&reopened).await?;
        *pool = reopened;

        info!(source = %source.display(), "State store imported");
        Ok(())
    }

    /// Compacts the database: snapshot into a temporary file, swap
    /// atomically, reopen
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.clone() else {
            // In-memory stores compact in place
            let pool = self.pool.read().await;
            sqlx::query("VACUUM").execute(&*pool).await?;
            return Ok(());
        };

        let temp = path.with_extension("db.compact");
        self.export(&temp).await?;

        let mut pool = self.pool.write().await;
        pool.close().await;

        for suffix in ["-wal", "-shm"] {
            let mut sidecar = path.as_os_str().to_owned();
            sidecar.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(sidecar));
        }
        std::fs::rename(&temp, &path)?;

        let reopened = open_pool(&path).await?;
        create_buckets(&reopened).await?;
        *pool = reopened;

        info!(path = %path.display(), "State store compacted");
        Ok(())
    }

    /// Closes the underlying pool
    pub async fn close(&self) {
        let pool = self.pool.read().await;
        pool.close().await;
    }
}
