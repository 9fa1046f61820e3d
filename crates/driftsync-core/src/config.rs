//! Configuration
//!
//! Typed configuration mapping the YAML configuration file, with defaults,
//! validation and environment-variable overrides. Layering order (weakest
//! first): built-in defaults, configuration file, environment variables
//! (`DRIFTSYNC_<SECTION>_<KEY>`), CLI flags (applied by the binary).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::conflict::ResolutionStrategy;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "DRIFTSYNC";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub files: FilesConfig,
    pub conflicts: ConflictsConfig,
    pub providers: HashMap<String, ProviderConfig>,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub performance: PerformanceConfig,
}

/// Engine loop and pipeline behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root directory of the local tree being synchronized
    pub root: PathBuf,
    /// Remote destination root (POSIX-style, empty for store root)
    pub destination: String,
    /// Seconds between periodic sync cycles
    pub interval: u64,
    /// Events handed to the pipeline per flush
    pub batch_size: usize,
    /// Seconds between queue flushes
    pub flush_interval: u64,
    /// Milliseconds a path must stay quiet before its event settles
    pub debounce_ms: u64,
    /// Maximum concurrent remote operations
    pub max_concurrent: usize,
    /// Per-phase retry attempts in the pipeline
    pub retry_attempts: u32,
    /// Seconds between phase retries
    pub retry_delay: u64,
    /// Whole-pipeline timeout in seconds
    pub timeout: u64,
    /// Sync policy: `one_way`, `mirror` or `backup`
    pub strategy: String,
    /// Default conflict resolution strategy name
    pub conflict_resolution: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("Drift"),
            destination: String::new(),
            interval: 300,
            batch_size: 100,
            flush_interval: 5,
            debounce_ms: 100,
            max_concurrent: 8,
            retry_attempts: 3,
            retry_delay: 5,
            timeout: 30 * 60,
            strategy: "one_way".to_string(),
            conflict_resolution: "keep_local".to_string(),
        }
    }
}

/// Content hash algorithm used by the watcher and verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

/// Watcher and strategy file filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Maximum file size in bytes; 0 disables the limit
    pub max_file_size: u64,
    pub preserve_timestamps: bool,
    pub preserve_permissions: bool,
    pub hash_algorithm: HashAlgorithm,
    pub ignore_patterns: Vec<String>,
    pub include_patterns: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size: 0,
            preserve_timestamps: true,
            preserve_permissions: false,
            hash_algorithm: HashAlgorithm::Sha256,
            ignore_patterns: Vec::new(),
            include_patterns: Vec::new(),
        }
    }
}

/// A conflict resolution rule evaluated in order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictRuleConfig {
    /// Glob pattern matched against the conflicted path
    pub pattern: String,
    /// Optional extension filter (e.g. `.docx`)
    pub file_type: Option<String>,
    /// Strategy name applied when the rule matches
    pub strategy: String,
    /// Extra conditions: `conflict_type`, `size_greater_than`,
    /// `size_less_than`
    pub conditions: HashMap<String, serde_yaml::Value>,
}

/// Conflict resolver behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictsConfig {
    pub default_strategy: String,
    pub auto_resolve: bool,
    pub backup_conflicts: bool,
    pub backup_dir: PathBuf,
    pub prefer_newer: bool,
    pub prefer_larger: bool,
    pub merge_text_files: bool,
    pub rules: Vec<ConflictRuleConfig>,
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            default_strategy: "keep_local".to_string(),
            auto_resolve: false,
            backup_conflicts: true,
            backup_dir: PathBuf::from(".conflicts"),
            prefer_newer: true,
            prefer_larger: false,
            merge_text_files: false,
            rules: Vec::new(),
        }
    }
}

/// Object-store provider settings (per named provider)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub credentials_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    /// Files above this size (bytes) use chunked transfer
    pub chunk_threshold: u64,
    pub chunk_size: u64,
    pub max_retries: u32,
    /// Requests per minute; 0 disables rate limiting
    pub rate_limit: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            token_path: None,
            chunk_threshold: 8 * 1024 * 1024,
            chunk_size: 4 * 1024 * 1024,
            max_retries: 3,
            rate_limit: 0,
        }
    }
}

/// Telemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    /// Optional log file; stderr when unset
    pub file: Option<PathBuf>,
    /// Maximum size of a single log file in MiB before rotation
    pub max_size_mb: u64,
    /// Rotated files to keep
    pub max_backups: u32,
    /// Days to keep rotated files
    pub max_age_days: u32,
    pub compress: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_size_mb: 50,
            max_backups: 5,
            max_age_days: 30,
            compress: true,
        }
    }
}

/// State store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: PathBuf,
    pub backup_enabled: bool,
    /// Hours between automatic backups
    pub backup_interval: u64,
    /// Days of transaction history to retain
    pub retention_days: u32,
    /// Hours between automatic compactions
    pub compact_interval: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("driftsync")
                .join("driftsync.db"),
            backup_enabled: false,
            backup_interval: 24,
            retention_days: 30,
            compact_interval: 24,
        }
    }
}

/// Resource caps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enable_caching: bool,
    /// Cache TTL in seconds
    pub cache_ttl: u64,
    /// Soft memory cap in bytes; 0 disables
    pub max_memory: u64,
    /// Bandwidth cap in bytes/second; 0 disables
    pub bandwidth_limit: u64,
    /// Worker threads for the runtime; 0 uses the runtime default
    pub worker_threads: usize,
    /// Maximum pending entries in the change queue
    pub queue_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_caching: true,
            cache_ttl: 300,
            max_memory: 0,
            bandwidth_limit: 0,
            worker_threads: 0,
            queue_size: 10_000,
        }
    }
}

/// A single validation error found in the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.interval"`
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const VALID_STRATEGIES: &[&str] = &["one_way", "mirror", "backup"];

impl Config {
    /// Loads configuration from a YAML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Tries to load from `path`; falls back to defaults on any error
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Loads from the default path (or defaults), then applies environment
    /// overrides
    pub fn load_layered(path: Option<&Path>) -> Self {
        let mut config = match path {
            Some(p) => Self::load_or_default(p),
            None => Self::load_or_default(&Self::default_path()),
        };
        config.apply_env_overrides(std::env::vars());
        config
    }

    /// Platform-appropriate default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("driftsync")
            .join("config.yaml")
    }

    /// Applies `DRIFTSYNC_<SECTION>_<KEY>` overrides from an environment
    /// iterator
    ///
    /// Unknown keys and unparseable values are ignored with a warning.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{ENV_PREFIX}_");
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let Some((section, field)) = rest.split_once('_') else {
                continue;
            };
            if !self.apply_override(&section.to_lowercase(), &field.to_lowercase(), &value) {
                tracing::warn!(key = %key, "Ignoring unrecognized environment override");
            }
        }
    }

    fn apply_override(&mut self, section: &str, field: &str, value: &str) -> bool {
        fn parse<T: std::str::FromStr>(value: &str, slot: &mut T) -> bool {
            match value.parse() {
                Ok(v) => {
                    *slot = v;
                    true
                }
                Err(_) => false,
            }
        }

        match (section, field) {
            ("sync", "root") => {
                self.sync.root = PathBuf::from(value);
                true
            }
            ("sync", "destination") => {
                self.sync.destination = value.to_string();
                true
            }
            ("sync", "interval") => parse(value, &mut self.sync.interval),
            ("sync", "batch_size") => parse(value, &mut self.sync.batch_size),
            ("sync", "flush_interval") => parse(value, &mut self.sync.flush_interval),
            ("sync", "debounce_ms") => parse(value, &mut self.sync.debounce_ms),
            ("sync", "max_concurrent") => parse(value, &mut self.sync.max_concurrent),
            ("sync", "retry_attempts") => parse(value, &mut self.sync.retry_attempts),
            ("sync", "retry_delay") => parse(value, &mut self.sync.retry_delay),
            ("sync", "timeout") => parse(value, &mut self.sync.timeout),
            ("sync", "strategy") => {
                self.sync.strategy = value.to_string();
                true
            }
            ("sync", "conflict_resolution") => {
                self.sync.conflict_resolution = value.to_string();
                true
            }
            ("files", "max_file_size") => parse(value, &mut self.files.max_file_size),
            ("files", "hash_algorithm") => match value {
                "md5" => {
                    self.files.hash_algorithm = HashAlgorithm::Md5;
                    true
                }
                "sha256" => {
                    self.files.hash_algorithm = HashAlgorithm::Sha256;
                    true
                }
                _ => false,
            },
            ("logging", "level") => {
                self.logging.level = value.to_string();
                true
            }
            ("logging", "file") => {
                self.logging.file = Some(PathBuf::from(value));
                true
            }
            ("database", "path") => {
                self.database.path = PathBuf::from(value);
                true
            }
            ("database", "retention_days") => parse(value, &mut self.database.retention_days),
            ("database", "compact_interval") => parse(value, &mut self.database.compact_interval),
            ("performance", "queue_size") => parse(value, &mut self.performance.queue_size),
            ("performance", "worker_threads") => parse(value, &mut self.performance.worker_threads),
            ("performance", "bandwidth_limit") => {
                parse(value, &mut self.performance.bandwidth_limit)
            }
            _ => false,
        }
    }

    /// Validates the configuration and returns all errors found
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.sync.interval == 0 {
            errors.push(ValidationError {
                field: "sync.interval".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.sync.batch_size == 0 {
            errors.push(ValidationError {
                field: "sync.batch_size".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.sync.flush_interval == 0 {
            errors.push(ValidationError {
                field: "sync.flush_interval".into(),
                message: "must be greater than zero".into(),
            });
        }
        if !VALID_STRATEGIES.contains(&self.sync.strategy.as_str()) {
            errors.push(ValidationError {
                field: "sync.strategy".into(),
                message: format!(
                    "'{}' is not a valid strategy (expected one of {})",
                    self.sync.strategy,
                    VALID_STRATEGIES.join(", ")
                ),
            });
        }
        if ResolutionStrategy::parse(&self.sync.conflict_resolution).is_none() {
            errors.push(ValidationError {
                field: "sync.conflict_resolution".into(),
                message: format!("'{}' is not a valid strategy", self.sync.conflict_resolution),
            });
        }
        if ResolutionStrategy::parse(&self.conflicts.default_strategy).is_none() {
            errors.push(ValidationError {
                field: "conflicts.default_strategy".into(),
                message: format!(
                    "'{}' is not a valid strategy",
                    self.conflicts.default_strategy
                ),
            });
        }
        for (i, rule) in self.conflicts.rules.iter().enumerate() {
            if ResolutionStrategy::parse(&rule.strategy).is_none() {
                errors.push(ValidationError {
                    field: format!("conflicts.rules[{i}].strategy"),
                    message: format!("'{}' is not a valid strategy", rule.strategy),
                });
            }
            if rule.pattern.is_empty() {
                errors.push(ValidationError {
                    field: format!("conflicts.rules[{i}].pattern"),
                    message: "must not be empty".into(),
                });
            }
        }
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "'{}' is not a valid level (expected one of {})",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if self.performance.queue_size == 0 {
            errors.push(ValidationError {
                field: "performance.queue_size".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.database.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "database.path".into(),
                message: "must not be empty".into(),
            });
        }

        errors
    }
}
