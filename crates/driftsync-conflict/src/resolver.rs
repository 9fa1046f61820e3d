//! Conflict resolver
//!
//! Strategy selection order:
//! 1. the first matching configured rule,
//! 2. auto-resolution preferences (`prefer_newer`, then `prefer_larger`)
//!    when `auto_resolve` is on,
//! 3. the configured default strategy.
//!
//! `Merge` degrades deterministically to `KeepBoth` (a real three-way
//! merge is not attempted); `Interactive` degrades to the default
//! strategy without prompting.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info, warn};

use driftsync_core::config::ConflictsConfig;
use driftsync_core::domain::{Conflict, Resolution, ResolutionStrategy, Winner};
use driftsync_core::error::CoreError;

use crate::rules::CompiledRule;

/// File extensions considered mergeable plain text
const MERGEABLE_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".json", ".xml", ".yaml", ".yml", ".rs", ".go", ".js", ".ts", ".py", ".java",
    ".c", ".cpp", ".h", ".html", ".css", ".scss", ".less", ".sh", ".bash", ".zsh", ".conf",
    ".config", ".ini", ".toml",
];

/// Resolver configuration, derived from the `conflicts` config section
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub default_strategy: ResolutionStrategy,
    pub auto_resolve: bool,
    pub backup_conflicts: bool,
    pub backup_dir: String,
    pub prefer_newer: bool,
    pub prefer_larger: bool,
    pub merge_text_files: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_strategy: ResolutionStrategy::KeepLocal,
            auto_resolve: false,
            backup_conflicts: true,
            backup_dir: ".conflicts".to_string(),
            prefer_newer: true,
            prefer_larger: false,
            merge_text_files: false,
        }
    }
}

impl From<&ConflictsConfig> for ResolverConfig {
    fn from(config: &ConflictsConfig) -> Self {
        Self {
            default_strategy: ResolutionStrategy::parse(&config.default_strategy)
                .unwrap_or(ResolutionStrategy::KeepLocal),
            auto_resolve: config.auto_resolve,
            backup_conflicts: config.backup_conflicts,
            backup_dir: config.backup_dir.to_string_lossy().into_owned(),
            prefer_newer: config.prefer_newer,
            prefer_larger: config.prefer_larger,
            merge_text_files: config.merge_text_files,
        }
    }
}

/// Counters describing resolver activity
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ResolutionStats {
    pub total: u64,
    pub auto_resolved: u64,
    pub failed: u64,
    pub by_strategy: HashMap<String, u64>,
}

/// Rule-based conflict resolver
pub struct ConflictResolver {
    config: ResolverConfig,
    rules: Vec<CompiledRule>,
    stats: Mutex<ResolutionStats>,
}

impl ConflictResolver {
    /// Builds a resolver from the `conflicts` configuration section
    ///
    /// Invalid rules are skipped with a warning.
    pub fn from_config(config: &ConflictsConfig) -> Self {
        let rules: Vec<CompiledRule> =
            config.rules.iter().filter_map(CompiledRule::compile).collect();

        debug!(
            rules = rules.len(),
            default = %ResolverConfig::from(config).default_strategy,
            "Conflict resolver initialized"
        );

        Self {
            config: ResolverConfig::from(config),
            rules,
            stats: Mutex::new(ResolutionStats::default()),
        }
    }

    pub fn new(config: ResolverConfig, rules: Vec<CompiledRule>) -> Self {
        Self {
            config,
            rules,
            stats: Mutex::new(ResolutionStats::default()),
        }
    }

    /// Resolves a single conflict
    pub fn resolve(&self, conflict: &Conflict) -> Result<Resolution, CoreError> {
        let strategy = self.determine_strategy(conflict);

        info!(
            path = %conflict.path,
            kind = %conflict.kind,
            strategy = %strategy,
            "Resolving conflict"
        );

        let resolution = self.apply(strategy, conflict)?;

        let mut stats = self.stats.lock().unwrap();
        stats.total += 1;
        *stats
            .by_strategy
            .entry(resolution.strategy.as_str().to_string())
            .or_default() += 1;
        if self.config.auto_resolve {
            stats.auto_resolved += 1;
        }

        Ok(resolution)
    }

    /// Resolves a batch, continuing past individual failures
    pub fn resolve_many(&self, conflicts: &[Conflict]) -> Vec<(String, Resolution)> {
        let mut resolutions = Vec::with_capacity(conflicts.len());
        for conflict in conflicts {
            match self.resolve(conflict) {
                Ok(resolution) => resolutions.push((conflict.id.clone(), resolution)),
                Err(e) => {
                    warn!(path = %conflict.path, error = %e, "Failed to resolve conflict");
                    self.stats.lock().unwrap().failed += 1;
                }
            }
        }
        resolutions
    }

    pub fn stats(&self) -> ResolutionStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn rules_count(&self) -> usize {
        self.rules.len()
    }

    /// Picks the strategy: rules, then auto preferences, then default
    fn determine_strategy(&self, conflict: &Conflict) -> ResolutionStrategy {
        for rule in &self.rules {
            if rule.matches(conflict) {
                debug!(
                    path = %conflict.path,
                    pattern = %rule.pattern(),
                    strategy = %rule.strategy(),
                    "Conflict rule matched"
                );
                return rule.strategy();
            }
        }

        if self.config.auto_resolve {
            if self.config.prefer_newer {
                let local_newer = match (conflict.local.modified, conflict.remote.modified) {
                    (Some(local), Some(remote)) => local > remote,
                    (Some(_), None) => true,
                    _ => false,
                };
                return if local_newer {
                    ResolutionStrategy::KeepLocal
                } else {
                    ResolutionStrategy::KeepRemote
                };
            }
            if self.config.prefer_larger {
                return if conflict.local.size > conflict.remote.size {
                    ResolutionStrategy::KeepLocal
                } else {
                    ResolutionStrategy::KeepRemote
                };
            }
        }

        self.config.default_strategy
    }

    fn apply(
        &self,
        strategy: ResolutionStrategy,
        conflict: &Conflict,
    ) -> Result<Resolution, CoreError> {
        match strategy {
            ResolutionStrategy::KeepLocal => Ok(self.keep_side(conflict, Winner::Local)),
            ResolutionStrategy::KeepRemote => Ok(self.keep_side(conflict, Winner::Remote)),
            ResolutionStrategy::KeepNewer => {
                let local_newer = match (conflict.local.modified, conflict.remote.modified) {
                    (Some(local), Some(remote)) => local >= remote,
                    (Some(_), None) => true,
                    _ => false,
                };
                let mut resolution = self.keep_side(
                    conflict,
                    if local_newer { Winner::Local } else { Winner::Remote },
                );
                resolution.strategy = ResolutionStrategy::KeepNewer;
                Ok(resolution)
            }
            ResolutionStrategy::KeepLarger => {
                let local_larger = conflict.local.size >= conflict.remote.size;
                let mut resolution = self.keep_side(
                    conflict,
                    if local_larger { Winner::Local } else { Winner::Remote },
                );
                resolution.strategy = ResolutionStrategy::KeepLarger;
                Ok(resolution)
            }
            ResolutionStrategy::KeepBoth => Ok(keep_both(&conflict.path)),
            ResolutionStrategy::Merge => {
                // No three-way merge is attempted; mergeable or not, the
                // outcome degrades to keeping both copies
                if !self.is_mergeable(&conflict.path) {
                    debug!(path = %conflict.path, "Not mergeable, keeping both");
                } else {
                    warn!(path = %conflict.path, "Text merge degrades to keeping both copies");
                }
                Ok(keep_both(&conflict.path))
            }
            ResolutionStrategy::Rename => {
                let mut resolution = Resolution::new(ResolutionStrategy::Rename);
                resolution.resolved_path = Some(sibling_with_label(&conflict.path, "renamed"));
                Ok(resolution)
            }
            ResolutionStrategy::Skip => Ok(Resolution::new(ResolutionStrategy::Skip)),
            ResolutionStrategy::Interactive => {
                // Never prompts: fall back to the configured default
                let fallback = if self.config.default_strategy == ResolutionStrategy::Interactive {
                    ResolutionStrategy::Skip
                } else {
                    self.config.default_strategy
                };
                warn!(
                    path = %conflict.path,
                    fallback = %fallback,
                    "Interactive resolution degrades to the default strategy"
                );
                self.apply(fallback, conflict)
            }
            ResolutionStrategy::Custom => {
                let fallback = if self.config.default_strategy == ResolutionStrategy::Custom {
                    ResolutionStrategy::Skip
                } else {
                    self.config.default_strategy
                };
                warn!(
                    path = %conflict.path,
                    fallback = %fallback,
                    "No custom resolver registered, using the default strategy"
                );
                self.apply(fallback, conflict)
            }
        }
    }

    /// Builds a KeepLocal/KeepRemote resolution, recording a backup path
    /// for the losing side when configured
    fn keep_side(&self, conflict: &Conflict, winner: Winner) -> Resolution {
        let strategy = match winner {
            Winner::Local => ResolutionStrategy::KeepLocal,
            _ => ResolutionStrategy::KeepRemote,
        };
        let mut resolution = Resolution::new(strategy);
        resolution.winner = Some(winner);

        if self.config.backup_conflicts {
            let side = match winner {
                Winner::Local => "remote",
                _ => "local",
            };
            resolution.backup_path = Some(backup_path(&self.config.backup_dir, &conflict.path, side));
        }

        resolution
    }

    fn is_mergeable(&self, path: &str) -> bool {
        if !self.config.merge_text_files {
            return false;
        }
        let ext = Path::new(path)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        MERGEABLE_EXTENSIONS.contains(&ext.as_str())
    }
}

/// `<backup_dir>/<basename>_<side>_<YYYYMMDD_HHMMSS>`
fn backup_path(backup_dir: &str, original: &str, side: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let basename = Path::new(original)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| original.to_string());
    format!("{backup_dir}/{basename}_{side}_{timestamp}")
}

/// KeepBoth resolution: `<dir>/<stem>_local_<ts><ext>` for the local
/// copy, `<dir>/<stem>_remote_<ts><ext>` for the remote copy
fn keep_both(path: &str) -> Resolution {
    let mut resolution = Resolution::new(ResolutionStrategy::KeepBoth);
    resolution.resolved_path = Some(sibling_with_label(path, "local"));
    resolution.backup_path = Some(sibling_with_label(path, "remote"));
    resolution
}

/// `<dir>/<stem>_<label>_<YYYYMMDD_HHMMSS><ext>`
fn sibling_with_label(path: &str, label: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let p = Path::new(path);
    let dir = p.parent().map(|d| d.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = p
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    let ext = p
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    if dir.is_empty() {
        format!("{stem}_{label}_{timestamp}{ext}")
    } else {
        format!("{dir}/{stem}_{label}_{timestamp}{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Duration;
    use driftsync_core::config::ConflictRuleConfig;
    use driftsync_core::domain::{ConflictFile, ConflictKind};

    fn conflict_with(
        path: &str,
        local_size: u64,
        remote_size: u64,
        local_newer: bool,
    ) -> Conflict {
        let now = Utc::now();
        let (local_mtime, remote_mtime) = if local_newer {
            (now, now - Duration::hours(1))
        } else {
            (now - Duration::hours(1), now)
        };

        let local = ConflictFile {
            path: path.to_string(),
            hash: "lh".to_string(),
            size: local_size,
            modified: Some(local_mtime),
        };
        let remote = ConflictFile {
            path: path.to_string(),
            hash: "rh".to_string(),
            size: remote_size,
            modified: Some(remote_mtime),
        };
        Conflict::new(path, ConflictKind::BothModified, local, remote)
    }

    fn resolver(config: ResolverConfig) -> ConflictResolver {
        ConflictResolver::new(config, Vec::new())
    }

    #[test]
    fn test_default_strategy_applies() {
        let resolver = resolver(ResolverConfig::default());
        let resolution = resolver.resolve(&conflict_with("docs/c.txt", 1, 1, true)).unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::KeepLocal);
        assert_eq!(resolution.winner, Some(Winner::Local));
        assert!(!resolution.manual);
    }

    #[test]
    fn test_keep_local_backup_path_shape() {
        let resolver = resolver(ResolverConfig::default());
        let resolution = resolver.resolve(&conflict_with("docs/c.txt", 1, 1, true)).unwrap();

        let backup = resolution.backup_path.unwrap();
        assert!(backup.starts_with(".conflicts/c.txt_remote_"));
        // Timestamp suffix is YYYYMMDD_HHMMSS
        let suffix = backup.rsplit("c.txt_remote_").next().unwrap();
        assert_eq!(suffix.len(), 15);
    }

    #[test]
    fn test_no_backup_when_disabled() {
        let config = ResolverConfig {
            backup_conflicts: false,
            ..Default::default()
        };
        let resolution = resolver(config)
            .resolve(&conflict_with("c.txt", 1, 1, true))
            .unwrap();
        assert!(resolution.backup_path.is_none());
    }

    #[test]
    fn test_auto_resolve_prefer_newer() {
        let config = ResolverConfig {
            auto_resolve: true,
            prefer_newer: true,
            ..Default::default()
        };
        let resolver = resolver(config);

        let local_newer = resolver.resolve(&conflict_with("a.txt", 1, 1, true)).unwrap();
        assert_eq!(local_newer.winner, Some(Winner::Local));

        let remote_newer = resolver.resolve(&conflict_with("a.txt", 1, 1, false)).unwrap();
        assert_eq!(remote_newer.winner, Some(Winner::Remote));
    }

    #[test]
    fn test_auto_resolve_prefer_larger() {
        let config = ResolverConfig {
            auto_resolve: true,
            prefer_newer: false,
            prefer_larger: true,
            ..Default::default()
        };
        let resolver = resolver(config);

        let local_larger = resolver.resolve(&conflict_with("a.txt", 100, 10, false)).unwrap();
        assert_eq!(local_larger.winner, Some(Winner::Local));

        let remote_larger = resolver.resolve(&conflict_with("a.txt", 10, 100, true)).unwrap();
        assert_eq!(remote_larger.winner, Some(Winner::Remote));
    }

    #[test]
    fn test_rule_overrides_auto_and_default() {
        let rule = CompiledRule::compile(&ConflictRuleConfig {
            pattern: "docs/*".to_string(),
            file_type: None,
            strategy: "skip".to_string(),
            conditions: HashMap::new(),
        })
        .unwrap();
        let config = ResolverConfig {
            auto_resolve: true,
            ..Default::default()
        };
        let resolver = ConflictResolver::new(config, vec![rule]);

        let resolution = resolver.resolve(&conflict_with("docs/a.txt", 1, 1, true)).unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::Skip);

        // Outside the rule's pattern, auto-resolve applies
        let resolution = resolver.resolve(&conflict_with("src/a.txt", 1, 1, true)).unwrap();
        assert_eq!(resolution.winner, Some(Winner::Local));
    }

    #[test]
    fn test_keep_both_path_shapes() {
        let config = ResolverConfig {
            default_strategy: ResolutionStrategy::KeepBoth,
            ..Default::default()
        };
        let resolution = resolver(config)
            .resolve(&conflict_with("docs/report.txt", 1, 1, true))
            .unwrap();

        assert_eq!(resolution.strategy, ResolutionStrategy::KeepBoth);
        assert!(resolution.winner.is_none());
        let resolved = resolution.resolved_path.unwrap();
        let backup = resolution.backup_path.unwrap();
        assert!(resolved.starts_with("docs/report_local_"));
        assert!(resolved.ends_with(".txt"));
        assert!(backup.starts_with("docs/report_remote_"));
        assert!(backup.ends_with(".txt"));
    }

    #[test]
    fn test_merge_degrades_to_keep_both() {
        let config = ResolverConfig {
            default_strategy: ResolutionStrategy::Merge,
            merge_text_files: true,
            ..Default::default()
        };
        let resolution = resolver(config)
            .resolve(&conflict_with("notes.md", 1, 1, true))
            .unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::KeepBoth);
        assert!(resolution.resolved_path.is_some());
    }

    #[test]
    fn test_merge_of_binary_degrades_to_keep_both() {
        let config = ResolverConfig {
            default_strategy: ResolutionStrategy::Merge,
            merge_text_files: true,
            ..Default::default()
        };
        let resolution = resolver(config)
            .resolve(&conflict_with("image.png", 1, 1, true))
            .unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::KeepBoth);
    }

    #[test]
    fn test_interactive_degrades_to_default() {
        let rule = CompiledRule::compile(&ConflictRuleConfig {
            pattern: "*".to_string(),
            file_type: None,
            strategy: "interactive".to_string(),
            conditions: HashMap::new(),
        })
        .unwrap();
        let config = ResolverConfig {
            default_strategy: ResolutionStrategy::KeepRemote,
            ..Default::default()
        };
        let resolver = ConflictResolver::new(config, vec![rule]);

        let resolution = resolver.resolve(&conflict_with("a.txt", 1, 1, true)).unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::KeepRemote);
        assert_eq!(resolution.winner, Some(Winner::Remote));
    }

    #[test]
    fn test_interactive_default_falls_back_to_skip() {
        let config = ResolverConfig {
            default_strategy: ResolutionStrategy::Interactive,
            ..Default::default()
        };
        let resolution = resolver(config)
            .resolve(&conflict_with("a.txt", 1, 1, true))
            .unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::Skip);
    }

    #[test]
    fn test_keep_newer_and_keep_larger() {
        let config = ResolverConfig {
            default_strategy: ResolutionStrategy::KeepNewer,
            ..Default::default()
        };
        let resolution = resolver(config)
            .resolve(&conflict_with("a.txt", 1, 1, false))
            .unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::KeepNewer);
        assert_eq!(resolution.winner, Some(Winner::Remote));

        let config = ResolverConfig {
            default_strategy: ResolutionStrategy::KeepLarger,
            ..Default::default()
        };
        let resolution = resolver(config)
            .resolve(&conflict_with("a.txt", 5, 50, true))
            .unwrap();
        assert_eq!(resolution.strategy, ResolutionStrategy::KeepLarger);
        assert_eq!(resolution.winner, Some(Winner::Remote));
    }

    #[test]
    fn test_stats_track_resolutions() {
        let resolver = resolver(ResolverConfig::default());
        resolver.resolve(&conflict_with("a.txt", 1, 1, true)).unwrap();
        resolver.resolve(&conflict_with("b.txt", 1, 1, true)).unwrap();

        let stats = resolver.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_strategy.get("keep_local"), Some(&2));
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_resolve_many() {
        let resolver = resolver(ResolverConfig::default());
        let conflicts = vec![
            conflict_with("a.txt", 1, 1, true),
            conflict_with("b.txt", 1, 1, true),
        ];
        let resolutions = resolver.resolve_many(&conflicts);
        assert_eq!(resolutions.len(), 2);
        assert_eq!(resolutions[0].0, conflicts[0].id);
    }

    #[test]
    fn test_from_config_skips_bad_rules() {
        let mut config = driftsync_core::config::ConflictsConfig::default();
        config.rules.push(ConflictRuleConfig {
            pattern: "[bad".to_string(),
            file_type: None,
            strategy: "keep_local".to_string(),
            conditions: HashMap::new(),
        });
        config.rules.push(ConflictRuleConfig {
            pattern: "*.txt".to_string(),
            file_type: None,
            strategy: "keep_both".to_string(),
            conditions: HashMap::new(),
        });

        let resolver = ConflictResolver::from_config(&config);
        assert_eq!(resolver.rules_count(), 1);
    }
}
