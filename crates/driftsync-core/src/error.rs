//! Error taxonomy
//!
//! Every failure in the sync core is classified into one of the
//! [`ErrorKind`] categories, each with a default retryability. Errors carry
//! a short message, an optional underlying cause and an arbitrary context
//! map for diagnostics.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Category of a sync-core error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failures, DNS, timeouts, 5xx, 429, 408
    Network,
    /// Missing/expired credentials, revoked tokens
    Auth,
    /// Local read/write failures, missing files, permissions
    FileSystem,
    /// Invalid inputs, missing required fields
    Validation,
    /// Malformed configuration
    Config,
    /// Engine invariant violations
    Sync,
    /// Remote-side errors not covered by the other kinds
    Provider,
    /// State-store failures
    Database,
}

impl ErrorKind {
    /// Default retryability for this kind
    pub fn default_retryable(self) -> bool {
        matches!(self, ErrorKind::Network)
    }

    /// Short lowercase label used in log output
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::FileSystem => "filesystem",
            ErrorKind::Validation => "validation",
            ErrorKind::Config => "config",
            ErrorKind::Sync => "sync",
            ErrorKind::Provider => "provider",
            ErrorKind::Database => "database",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified error carried through the sync core
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct CoreError {
    /// Error category
    pub kind: ErrorKind,
    /// Short human-readable message
    pub message: String,
    /// Underlying cause, if any
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    /// Whether the operation may be retried
    pub retryable: bool,
    /// Arbitrary key/value diagnostics
    pub context: HashMap<String, String>,
}

impl CoreError {
    /// Creates an error with the kind's default retryability
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            retryable: kind.default_retryable(),
            context: HashMap::new(),
        }
    }

    /// Attaches an underlying cause
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into().into());
        self
    }

    /// Overrides the default retryability
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Adds a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn filesystem(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileSystem, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn sync(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Sync, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Provider, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Returns true if the error is classified as the given kind
    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// Result alias used where the typed taxonomy matters
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = CoreError::network("connection reset");
        assert_eq!(err.to_string(), "[network] connection reset");
    }

    #[test]
    fn test_network_is_retryable_by_default() {
        assert!(CoreError::network("timeout").retryable);
    }

    #[test]
    fn test_other_kinds_not_retryable_by_default() {
        assert!(!CoreError::auth("token expired").retryable);
        assert!(!CoreError::filesystem("permission denied").retryable);
        assert!(!CoreError::validation("missing field").retryable);
        assert!(!CoreError::config("bad yaml").retryable);
        assert!(!CoreError::sync("invariant violated").retryable);
        assert!(!CoreError::provider("quota exceeded").retryable);
        assert!(!CoreError::database("bucket missing").retryable);
    }

    #[test]
    fn test_retryable_override() {
        let err = CoreError::provider("throttled").retryable(true);
        assert!(err.retryable);
    }

    #[test]
    fn test_context_map() {
        let err = CoreError::sync("phase failed")
            .with_context("phase", "collect")
            .with_context("attempt", "2");
        assert_eq!(err.context.get("phase").map(String::as_str), Some("collect"));
        assert_eq!(err.context.get("attempt").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = CoreError::filesystem("read failed").with_source(io);
        assert!(err.source.is_some());
    }
}
