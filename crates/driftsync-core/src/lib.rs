//! driftsync core - domain model and contracts
//!
//! This crate contains the shared vocabulary of the sync system:
//! - Domain entities (change events, file state, sync state, transactions,
//!   conflicts)
//! - The error taxonomy used across every crate
//! - Typed configuration with defaults, validation and environment overrides
//! - Port definitions (object store, sync strategy) for adapters

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use error::{CoreError, ErrorKind};
