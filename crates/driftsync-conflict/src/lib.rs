//! driftsync conflict resolution
//!
//! Chooses and applies a [`Resolution`] for a detected [`Conflict`]:
//! ordered rules first, then auto-resolution preferences, then the
//! configured default strategy. No interactive prompting: the
//! `Interactive` strategy deterministically degrades to the default.
//!
//! [`Conflict`]: driftsync_core::domain::Conflict
//! [`Resolution`]: driftsync_core::domain::Resolution

mod resolver;
mod rules;

pub use resolver::{ConflictResolver, ResolutionStats, ResolverConfig};
pub use rules::CompiledRule;
