//! File watcher
//!
//! Wraps the `notify` crate to monitor directory trees, converting raw OS
//! events into debounced, hash-verified [`ChangeEvent`] values:
//!
//! 1. Raw notify events are translated off the notify thread into a bounded
//!    channel; overflow blocks translation, which is the backpressure path.
//! 2. The monitor task applies ignore rules and (re)schedules a per-path
//!    debounce timer; only one event per path fires, with kinds coalesced
//!    under the Create > Modify > Delete > Rename > Chmod preference.
//! 3. On settle the path is stat'ed and rehashed on the blocking pool; a
//!    `Modify` whose content hash matches the cache is suppressed.
//!
//! The watched-path set, debounce timers and hash cache are guarded by
//! three independent locks. When more than one is held, the order is
//! paths, then timers, then hashes.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use md5::Md5;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use driftsync_core::config::HashAlgorithm;
use driftsync_core::domain::{ChangeEvent, ChangeKind};

use crate::ignore::IgnoreMatcher;

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period before a path's event settles
    pub debounce: Duration,
    pub hash_algorithm: HashAlgorithm,
    /// Capacity of the outbound event channel
    pub event_capacity: usize,
    /// Capacity of the error channel
    pub error_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            hash_algorithm: HashAlgorithm::Sha256,
            event_capacity: 100,
            error_capacity: 10,
        }
    }
}

/// Translated raw notify event, before debouncing
#[derive(Debug, Clone)]
struct RawChange {
    kind: ChangeKind,
    path: PathBuf,
    old_path: Option<PathBuf>,
}

/// A scheduled debounce timer and the kind it will fire with
struct PendingTimer {
    kind: ChangeKind,
    handle: JoinHandle<()>,
}

/// Shared state handed to the monitor and debounce tasks
#[derive(Clone)]
struct WatchCtx {
    config: WatcherConfig,
    ignore: Arc<StdRwLock<IgnoreMatcher>>,
    watched: Arc<StdRwLock<HashSet<PathBuf>>>,
    timers: Arc<StdMutex<HashMap<PathBuf, PendingTimer>>>,
    hashes: Arc<StdRwLock<HashMap<PathBuf, String>>>,
    notify: Arc<StdMutex<Option<RecommendedWatcher>>>,
    event_tx: mpsc::Sender<ChangeEvent>,
    token: CancellationToken,
}

/// Watches directory trees and emits debounced, hash-verified change
/// events
///
/// One watcher serves one engine run: `start` once, `stop` once. The
/// engine constructs a fresh watcher for each run.
pub struct FileWatcher {
    config: WatcherConfig,
    ignore: Arc<StdRwLock<IgnoreMatcher>>,
    watched: Arc<StdRwLock<HashSet<PathBuf>>>,
    timers: Arc<StdMutex<HashMap<PathBuf, PendingTimer>>>,
    hashes: Arc<StdRwLock<HashMap<PathBuf, String>>>,
    notify: Arc<StdMutex<Option<RecommendedWatcher>>>,
    event_tx: mpsc::Sender<ChangeEvent>,
    raw_rx: StdMutex<Option<mpsc::Receiver<RawChange>>>,
    token: CancellationToken,
    running: StdRwLock<bool>,
    monitor: StdMutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    /// Creates a watcher plus its event and error channels
    pub fn new(
        config: WatcherConfig,
    ) -> Result<(Self, mpsc::Receiver<ChangeEvent>, mpsc::Receiver<anyhow::Error>)> {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (error_tx, error_rx) = mpsc::channel(config.error_capacity);
        // Bounded: a full channel blocks raw-notify translation, slowing
        // the producer instead of dropping events
        let (raw_tx, raw_rx) = mpsc::channel::<RawChange>(config.event_capacity);

        let callback_error_tx = error_tx;
        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(raw) = map_notify_event(&event) {
                        if raw_tx.blocking_send(raw).is_err() {
                            debug!("Raw event receiver dropped, discarding event");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                    let _ = callback_error_tx.blocking_send(anyhow::Error::new(err));
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create OS file watcher")?;

        info!(
            debounce_ms = config.debounce.as_millis() as u64,
            hash_algorithm = config.hash_algorithm.as_str(),
            "File watcher created"
        );

        Ok((
            Self {
                config,
                ignore: Arc::new(StdRwLock::new(IgnoreMatcher::new())),
                watched: Arc::new(StdRwLock::new(HashSet::new())),
                timers: Arc::new(StdMutex::new(HashMap::new())),
                hashes: Arc::new(StdRwLock::new(HashMap::new())),
                notify: Arc::new(StdMutex::new(Some(watcher))),
                event_tx,
                raw_rx: StdMutex::new(Some(raw_rx)),
                token: CancellationToken::new(),
                running: StdRwLock::new(false),
                monitor: StdMutex::new(None),
            },
            event_rx,
            error_rx,
        ))
    }

    /// Starts watching the given roots
    pub async fn start(&self, roots: &[PathBuf]) -> Result<()> {
        {
            let mut running = self.running.write().unwrap();
            if *running {
                anyhow::bail!("watcher is already running");
            }
            *running = true;
        }

        let raw_rx = match self.raw_rx.lock().unwrap().take() {
            Some(rx) => rx,
            None => {
                *self.running.write().unwrap() = false;
                anyhow::bail!("watcher was already started once");
            }
        };

        let ctx = self.ctx();
        let monitor = tokio::spawn(monitor_loop(raw_rx, ctx));
        *self.monitor.lock().unwrap() = Some(monitor);

        for root in roots {
            if let Err(e) = self.add(root).await {
                warn!(path = %root.display(), error = %e, "Failed to add initial watch root");
            }
        }

        info!(roots = roots.len(), "File watcher started");
        Ok(())
    }

    /// Stops watching; no events are delivered after this returns
    pub async fn stop(&self) {
        {
            let mut running = self.running.write().unwrap();
            if !*running {
                return;
            }
            *running = false;
        }

        self.token.cancel();

        for (_, timer) in self.timers.lock().unwrap().drain() {
            timer.handle.abort();
        }

        // Dropping the OS watcher stops raw event production and closes
        // the raw channel, which ends the monitor task
        *self.notify.lock().unwrap() = None;

        let monitor = self.monitor.lock().unwrap().take();
        if let Some(handle) = monitor {
            let _ = handle.await;
        }

        info!("File watcher stopped");
    }

    /// Adds a path to the watch set
    ///
    /// Directories are registered recursively; every non-ignored file in
    /// the subtree has its content hash primed.
    pub async fn add(&self, path: &Path) -> Result<()> {
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("path does not exist: {}", path.display()))?;

        if meta.is_dir() {
            add_tree(
                &self.notify,
                &self.watched,
                &self.hashes,
                &self.ignore,
                path,
                self.config.hash_algorithm,
            )
            .await?;
        } else {
            {
                let mut guard = self.notify.lock().unwrap();
                let watcher = guard.as_mut().context("watcher has been stopped")?;
                watcher
                    .watch(path, RecursiveMode::NonRecursive)
                    .with_context(|| format!("failed to watch {}", path.display()))?;
            }
            self.watched.write().unwrap().insert(path.to_path_buf());

            let target = path.to_path_buf();
            let algo = self.config.hash_algorithm;
            if let Ok(Ok(hash)) =
                tokio::task::spawn_blocking(move || content_hash(&target, algo)).await
            {
                self.hashes.write().unwrap().insert(path.to_path_buf(), hash);
            }
        }

        info!(path = %path.display(), is_directory = meta.is_dir(), "Added watch path");
        Ok(())
    }

    /// Removes a path (and, for directories, its subtree) from the watch
    /// set
    pub async fn remove(&self, path: &Path) -> Result<()> {
        let to_remove: Vec<PathBuf> = {
            let watched = self.watched.read().unwrap();
            watched
                .iter()
                .filter(|p| p.starts_with(path))
                .cloned()
                .collect()
        };

        {
            let mut guard = self.notify.lock().unwrap();
            let watcher = guard.as_mut().context("watcher has been stopped")?;
            for p in &to_remove {
                if let Err(e) = watcher.unwatch(p) {
                    warn!(path = %p.display(), error = %e, "Failed to unwatch path");
                }
            }
        }

        {
            let mut watched = self.watched.write().unwrap();
            for p in &to_remove {
                watched.remove(p);
            }
        }
        {
            let mut hashes = self.hashes.write().unwrap();
            hashes.retain(|p, _| !p.starts_with(path));
        }

        info!(path = %path.display(), removed = to_remove.len(), "Removed watch path");
        Ok(())
    }

    /// Replaces the ignore rule set
    pub fn set_ignore_patterns<I, S>(&self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        *self.ignore.write().unwrap() = IgnoreMatcher::with_patterns(patterns);
    }

    /// Currently watched paths, unordered
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.read().unwrap().iter().cloned().collect()
    }

    pub fn is_watching(&self) -> bool {
        *self.running.read().unwrap()
    }

    fn ctx(&self) -> WatchCtx {
        WatchCtx {
            config: self.config.clone(),
            ignore: Arc::clone(&self.ignore),
            watched: Arc::clone(&self.watched),
            timers: Arc::clone(&self.timers),
            hashes: Arc::clone(&self.hashes),
            notify: Arc::clone(&self.notify),
            event_tx: self.event_tx.clone(),
            token: self.token.clone(),
        }
    }
}

// ============================================================================
// Monitor and debounce tasks
// ============================================================================

/// Consumes translated raw events, filters ignored paths and schedules
/// per-path debounce timers
async fn monitor_loop(mut raw_rx: mpsc::Receiver<RawChange>, ctx: WatchCtx) {
    loop {
        tokio::select! {
            _ = ctx.token.cancelled() => break,
            raw = raw_rx.recv() => {
                let Some(raw) = raw else { break };
                handle_raw(&ctx, raw);
            }
        }
    }
    debug!("Watcher monitor task stopped");
}

fn handle_raw(ctx: &WatchCtx, mut raw: RawChange) {
    if ctx.ignore.read().unwrap().should_ignore(&raw.path, false) {
        return;
    }

    let mut timers = ctx.timers.lock().unwrap();
    // A new event for the path restarts its quiet period. The kinds
    // coalesce with the Create > Modify preference: content changes to a
    // file created inside the window still settle as a Create.
    if let Some(existing) = timers.remove(&raw.path) {
        existing.handle.abort();
        raw.kind = coalesce_kind(existing.kind, raw.kind);
    }

    let path = raw.path.clone();
    let kind = raw.kind;
    let task_ctx = ctx.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(task_ctx.config.debounce).await;
        if !task_ctx.token.is_cancelled() {
            process_settled(&task_ctx, &raw).await;
        }
        task_ctx.timers.lock().unwrap().remove(&raw.path);
    });
    timers.insert(path, PendingTimer { kind, handle });
}

/// Coalesces the pending kind with a newer one for the same path
///
/// A Modify arriving after a pending Create keeps the Create (the file is
/// still new to the remote); otherwise the newer kind wins.
fn coalesce_kind(pending: ChangeKind, newer: ChangeKind) -> ChangeKind {
    if pending == ChangeKind::Create && newer == ChangeKind::Modify {
        ChangeKind::Create
    } else {
        newer
    }
}

/// Runs once a path has been quiet for the debounce window
async fn process_settled(ctx: &WatchCtx, raw: &RawChange) {
    let meta = tokio::fs::metadata(&raw.path).await.ok();

    let mut event = ChangeEvent::new(raw.kind, raw.path.clone());
    event.old_path = raw.old_path.clone();

    if let Some(meta) = &meta {
        event.size = meta.len();
        event.is_directory = meta.is_dir();

        if meta.is_file() && raw.kind != ChangeKind::Delete {
            let target = raw.path.clone();
            let algo = ctx.config.hash_algorithm;
            match tokio::task::spawn_blocking(move || content_hash(&target, algo)).await {
                Ok(Ok(hash)) => {
                    if raw.kind == ChangeKind::Modify {
                        let unchanged = ctx
                            .hashes
                            .read()
                            .unwrap()
                            .get(&raw.path)
                            .map(|cached| cached == &hash)
                            .unwrap_or(false);
                        if unchanged {
                            debug!(path = %raw.path.display(), "Content unchanged, suppressing modify event");
                            return;
                        }
                    }
                    ctx.hashes
                        .write()
                        .unwrap()
                        .insert(raw.path.clone(), hash.clone());
                    event.hash = hash;
                }
                Ok(Err(e)) => {
                    warn!(path = %raw.path.display(), error = %e, "Failed to hash file");
                }
                Err(e) => {
                    warn!(path = %raw.path.display(), error = %e, "Hash task failed");
                }
            }
        }

        // New directories join the watch set recursively
        if meta.is_dir() && raw.kind == ChangeKind::Create {
            if let Err(e) = add_tree(
                &ctx.notify,
                &ctx.watched,
                &ctx.hashes,
                &ctx.ignore,
                &raw.path,
                ctx.config.hash_algorithm,
            )
            .await
            {
                warn!(path = %raw.path.display(), error = %e, "Failed to watch created directory");
            }
        }
    }

    debug!(
        path = %event.path.display(),
        kind = %event.kind,
        size = event.size,
        "Change detected"
    );

    tokio::select! {
        _ = ctx.token.cancelled() => {}
        res = ctx.event_tx.send(event) => {
            if res.is_err() {
                warn!("Change event receiver dropped");
            }
        }
    }
}

// ============================================================================
// Tree registration and hashing
// ============================================================================

/// Recursively registers every non-ignored subdirectory and primes the
/// hash cache for every non-ignored file
async fn add_tree(
    notify: &Arc<StdMutex<Option<RecommendedWatcher>>>,
    watched: &Arc<StdRwLock<HashSet<PathBuf>>>,
    hashes: &Arc<StdRwLock<HashMap<PathBuf, String>>>,
    ignore: &Arc<StdRwLock<IgnoreMatcher>>,
    root: &Path,
    algo: HashAlgorithm,
) -> Result<()> {
    let ignore_snapshot = ignore.read().unwrap().clone();
    let scan_root = root.to_path_buf();
    let (dirs, file_hashes) =
        tokio::task::spawn_blocking(move || scan_tree(&scan_root, &ignore_snapshot, algo))
            .await
            .context("tree scan task failed")??;

    {
        let mut guard = notify.lock().unwrap();
        let watcher = guard.as_mut().context("watcher has been stopped")?;
        let mut watched_set = watched.write().unwrap();
        for dir in &dirs {
            if watched_set.contains(dir) {
                continue;
            }
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("failed to watch {}", dir.display()))?;
            watched_set.insert(dir.clone());
        }
    }

    hashes.write().unwrap().extend(file_hashes);
    Ok(())
}

/// Walks a directory tree, returning subdirectories to register and the
/// content hashes of regular files. Ignored entries are skipped; files
/// that fail to hash are skipped with a warning.
fn scan_tree(
    root: &Path,
    ignore: &IgnoreMatcher,
    algo: HashAlgorithm,
) -> std::io::Result<(Vec<PathBuf>, Vec<(PathBuf, String)>)> {
    let mut dirs = vec![root.to_path_buf()];
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if ignore.should_ignore(&path, file_type.is_dir()) {
                continue;
            }

            if file_type.is_dir() {
                dirs.push(path.clone());
                pending.push(path);
            } else if file_type.is_file() {
                match content_hash(&path, algo) {
                    Ok(hash) => files.push((path, hash)),
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to hash file during scan"),
                }
            }
        }
    }

    Ok((dirs, files))
}

/// Streams a file through the configured digest, returning the lowercase
/// hex hash
pub fn content_hash(path: &Path, algo: HashAlgorithm) -> std::io::Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; 8192];

    match algo {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        }
        HashAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        }
    }
}

// ============================================================================
// Event translation
// ============================================================================

/// Translates a raw notify event into a [`RawChange`]
///
/// When multiple interpretations apply the preference order is
/// Create > Modify > Delete > Rename > Chmod; access events and events
/// without paths are dropped.
fn map_notify_event(event: &notify::Event) -> Option<RawChange> {
    let path = event.paths.first()?.clone();

    match &event.kind {
        EventKind::Create(_) => Some(RawChange {
            kind: ChangeKind::Create,
            path,
            old_path: None,
        }),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other) => Some(RawChange {
            kind: ChangeKind::Modify,
            path,
            old_path: None,
        }),
        EventKind::Remove(_) => Some(RawChange {
            kind: ChangeKind::Delete,
            path,
            old_path: None,
        }),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if event.paths.len() >= 2 {
                Some(RawChange {
                    kind: ChangeKind::Rename,
                    path: event.paths[1].clone(),
                    old_path: Some(event.paths[0].clone()),
                })
            } else {
                Some(RawChange {
                    kind: ChangeKind::Rename,
                    path,
                    old_path: None,
                })
            }
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(RawChange {
            kind: ChangeKind::Chmod,
            path,
            old_path: None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notify_event(kind: EventKind, paths: Vec<PathBuf>) -> notify::Event {
        notify::Event {
            kind,
            paths,
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_map_create() {
        let event = notify_event(
            EventKind::Create(notify::event::CreateKind::File),
            vec![PathBuf::from("/a.txt")],
        );
        let raw = map_notify_event(&event).unwrap();
        assert_eq!(raw.kind, ChangeKind::Create);
        assert_eq!(raw.path, PathBuf::from("/a.txt"));
    }

    #[test]
    fn test_map_modify_data() {
        let event = notify_event(
            EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
            vec![PathBuf::from("/a.txt")],
        );
        assert_eq!(map_notify_event(&event).unwrap().kind, ChangeKind::Modify);
    }

    #[test]
    fn test_map_remove() {
        let event = notify_event(
            EventKind::Remove(notify::event::RemoveKind::File),
            vec![PathBuf::from("/a.txt")],
        );
        assert_eq!(map_notify_event(&event).unwrap().kind, ChangeKind::Delete);
    }

    #[test]
    fn test_map_rename_two_paths() {
        let event = notify_event(
            EventKind::Modify(ModifyKind::Name(notify::event::RenameMode::Both)),
            vec![PathBuf::from("/old.txt"), PathBuf::from("/new.txt")],
        );
        let raw = map_notify_event(&event).unwrap();
        assert_eq!(raw.kind, ChangeKind::Rename);
        assert_eq!(raw.path, PathBuf::from("/new.txt"));
        assert_eq!(raw.old_path, Some(PathBuf::from("/old.txt")));
    }

    #[test]
    fn test_map_rename_single_path() {
        let event = notify_event(
            EventKind::Modify(ModifyKind::Name(notify::event::RenameMode::From)),
            vec![PathBuf::from("/gone.txt")],
        );
        let raw = map_notify_event(&event).unwrap();
        assert_eq!(raw.kind, ChangeKind::Rename);
        assert!(raw.old_path.is_none());
    }

    #[test]
    fn test_map_metadata_is_chmod() {
        let event = notify_event(
            EventKind::Modify(ModifyKind::Metadata(
                notify::event::MetadataKind::Permissions,
            )),
            vec![PathBuf::from("/a.txt")],
        );
        assert_eq!(map_notify_event(&event).unwrap().kind, ChangeKind::Chmod);
    }

    #[test]
    fn test_map_access_dropped() {
        let event = notify_event(
            EventKind::Access(notify::event::AccessKind::Read),
            vec![PathBuf::from("/a.txt")],
        );
        assert!(map_notify_event(&event).is_none());
    }

    #[test]
    fn test_map_no_paths_dropped() {
        let event = notify_event(EventKind::Create(notify::event::CreateKind::File), vec![]);
        assert!(map_notify_event(&event).is_none());
    }

    #[test]
    fn test_coalesce_kind() {
        // Content changes inside the window keep a pending Create
        assert_eq!(
            coalesce_kind(ChangeKind::Create, ChangeKind::Modify),
            ChangeKind::Create
        );
        // Everything else: the newer kind wins
        assert_eq!(
            coalesce_kind(ChangeKind::Create, ChangeKind::Delete),
            ChangeKind::Delete
        );
        assert_eq!(
            coalesce_kind(ChangeKind::Modify, ChangeKind::Modify),
            ChangeKind::Modify
        );
        assert_eq!(
            coalesce_kind(ChangeKind::Modify, ChangeKind::Delete),
            ChangeKind::Delete
        );
        assert_eq!(
            coalesce_kind(ChangeKind::Delete, ChangeKind::Create),
            ChangeKind::Create
        );
    }

    #[test]
    fn test_content_hash_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, b"hello").unwrap();

        let hash = content_hash(&file, HashAlgorithm::Sha256).unwrap();
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_content_hash_md5() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, b"hello").unwrap();

        let hash = content_hash(&file, HashAlgorithm::Md5).unwrap();
        assert_eq!(hash, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_scan_tree_skips_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("src/a.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("node_modules/b.txt"), b"y").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"z").unwrap();

        let ignore = IgnoreMatcher::new();
        let (dirs, files) = scan_tree(dir.path(), &ignore, HashAlgorithm::Sha256).unwrap();

        assert!(dirs.contains(&dir.path().to_path_buf()));
        assert!(dirs.contains(&dir.path().join("src")));
        assert!(!dirs.contains(&dir.path().join("node_modules")));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, dir.path().join("src/a.txt"));
    }

    #[test]
    fn test_default_config() {
        let config = WatcherConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(100));
        assert_eq!(config.event_capacity, 100);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
    }
}
