//! driftsync engine
//!
//! Orchestrates the sync core: lifecycle (start / stop / pause / resume),
//! the periodic sync loop, the change-event monitor and the four-phase
//! pipeline (collect, analyze, execute, verify), persisting transactions
//! and state through the state store.
//!
//! ```text
//!  FileWatcher ──→ ChangeQueue ──→ pipeline ──→ ObjectStore
//!       │               │            │
//!       └───────────────┴────────────┴──→ StateStore
//! ```

mod engine;
mod metrics;
mod pipeline;

pub use engine::{EngineEvent, EngineStatus, SyncEngine};
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use pipeline::{PipelineConfig, PipelineInput, PipelineOutput, PipelinePhase, SyncPipeline};
