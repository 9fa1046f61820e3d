//! driftsync watch - filesystem observation and change queueing
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  FileWatcher ──→ bounded mpsc ──→ ChangeQueue ──→ engine pipeline
//!  (debounce,       (backpressure)   (dedupe,
//!   hash verify)                      persist)
//! ```
//!
//! The watcher emits at most one hash-verified [`ChangeEvent`] per
//! debounced path; the queue collapses repeats, persists the pending set
//! across restarts and hands time-bounded batches to the engine.
//!
//! [`ChangeEvent`]: driftsync_core::domain::ChangeEvent

pub mod ignore;
pub mod queue;
pub mod watcher;

pub use ignore::IgnoreMatcher;
pub use queue::{ChangeQueue, ProcessFn, QueueConfig, QueueStats};
pub use watcher::{FileWatcher, WatcherConfig};
