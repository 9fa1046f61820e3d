//! Port definitions (driven/secondary ports)
//!
//! Traits the sync core depends on, implemented by adapters. The in-memory
//! object store lives here too so every crate's tests can exercise the real
//! contract without a network.

pub mod memory;
pub mod object_store;
pub mod strategy;

pub use memory::MemoryStore;
pub use object_store::{ListPage, ObjectStore, QuotaInfo, RemoteContent, RemoteEntry, RemoteMetadata, StoreFile};
pub use strategy::{StrategyConfig, SyncDirection, SyncError, SyncRequest, SyncResult, SyncStrategy};
