//! Domain entities shared across the sync core
//!
//! Entities cross component boundaries by value. Mutation happens through
//! the helper methods on each type so that status invariants (for example
//! `Synced` implying matching hashes) stay in one place.

pub mod conflict;
pub mod event;
pub mod file_state;
pub mod sync_state;
pub mod transaction;

pub use conflict::{
    Conflict, ConflictFile, ConflictKind, ConflictSeverity, Resolution, ResolutionStatus,
    ResolutionStrategy, Winner,
};
pub use event::{ChangeEvent, ChangeKind, EventBatch, EventSource, EventStatus};
pub use file_state::{FileState, FileSyncStatus};
pub use sync_state::SyncState;
pub use transaction::{SyncTransaction, TransactionKind, TransactionStatus};
