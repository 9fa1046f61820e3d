//! Resolution rule compilation and matching
//!
//! Rules come from configuration as glob pattern + optional extension +
//! conditions. They are compiled once; invalid rules are skipped with a
//! warning. Rules are evaluated in order and the first match wins.

use glob::Pattern;
use tracing::warn;

use driftsync_core::config::ConflictRuleConfig;
use driftsync_core::domain::{Conflict, ResolutionStrategy};

/// Extra conditions a conflict must satisfy for a rule to apply
#[derive(Debug, Clone, Default)]
pub struct RuleConditions {
    pub conflict_type: Option<String>,
    pub size_greater_than: Option<u64>,
    pub size_less_than: Option<u64>,
}

/// A compiled, ready-to-evaluate resolution rule
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pattern: Pattern,
    raw_pattern: String,
    file_type: Option<String>,
    strategy: ResolutionStrategy,
    conditions: RuleConditions,
}

impl CompiledRule {
    /// Compiles a rule from configuration; `None` if the pattern or
    /// strategy is invalid
    pub fn compile(config: &ConflictRuleConfig) -> Option<Self> {
        let pattern = match Pattern::new(&config.pattern) {
            Ok(p) => p,
            Err(e) => {
                warn!(pattern = %config.pattern, error = %e, "Skipping conflict rule with invalid glob");
                return None;
            }
        };
        let strategy = match ResolutionStrategy::parse(&config.strategy) {
            Some(s) => s,
            None => {
                warn!(strategy = %config.strategy, "Skipping conflict rule with unknown strategy");
                return None;
            }
        };

        let mut conditions = RuleConditions::default();
        for (key, value) in &config.conditions {
            match key.as_str() {
                "conflict_type" => {
                    conditions.conflict_type = value.as_str().map(str::to_string);
                }
                "size_greater_than" => {
                    conditions.size_greater_than = value.as_u64();
                }
                "size_less_than" => {
                    conditions.size_less_than = value.as_u64();
                }
                other => {
                    warn!(condition = %other, "Ignoring unknown conflict rule condition");
                }
            }
        }

        Some(Self {
            pattern,
            raw_pattern: config.pattern.clone(),
            file_type: config.file_type.clone(),
            strategy,
            conditions,
        })
    }

    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    pub fn pattern(&self) -> &str {
        &self.raw_pattern
    }

    /// True when the pattern, extension filter and every condition hold
    pub fn matches(&self, conflict: &Conflict) -> bool {
        if !self.pattern.matches(&conflict.path) {
            return false;
        }

        if let Some(file_type) = &self.file_type {
            let ext = std::path::Path::new(&conflict.path)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            if &ext != file_type {
                return false;
            }
        }

        if let Some(kind) = &self.conditions.conflict_type {
            if conflict.kind.as_str() != kind {
                return false;
            }
        }
        if let Some(min) = self.conditions.size_greater_than {
            if conflict.local.size <= min {
                return false;
            }
        }
        if let Some(max) = self.conditions.size_less_than {
            if conflict.local.size >= max {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use driftsync_core::domain::{ConflictFile, ConflictKind};

    fn conflict(path: &str, local_size: u64) -> Conflict {
        let local = ConflictFile {
            path: path.to_string(),
            hash: "l".to_string(),
            size: local_size,
            modified: None,
        };
        let remote = ConflictFile {
            path: path.to_string(),
            hash: "r".to_string(),
            size: 10,
            modified: None,
        };
        Conflict::new(path, ConflictKind::BothModified, local, remote)
    }

    fn rule_config(pattern: &str, strategy: &str) -> ConflictRuleConfig {
        ConflictRuleConfig {
            pattern: pattern.to_string(),
            file_type: None,
            strategy: strategy.to_string(),
            conditions: HashMap::new(),
        }
    }

    #[test]
    fn test_compile_valid_rule() {
        let rule = CompiledRule::compile(&rule_config("docs/*.txt", "keep_both")).unwrap();
        assert_eq!(rule.strategy(), ResolutionStrategy::KeepBoth);
        assert!(rule.matches(&conflict("docs/a.txt", 1)));
        assert!(!rule.matches(&conflict("src/a.txt", 1)));
    }

    #[test]
    fn test_compile_invalid_pattern_skipped() {
        assert!(CompiledRule::compile(&rule_config("[bad", "keep_local")).is_none());
    }

    #[test]
    fn test_compile_invalid_strategy_skipped() {
        assert!(CompiledRule::compile(&rule_config("*.txt", "coin_flip")).is_none());
    }

    #[test]
    fn test_file_type_filter() {
        let mut config = rule_config("*", "keep_remote");
        config.file_type = Some(".docx".to_string());
        let rule = CompiledRule::compile(&config).unwrap();

        assert!(rule.matches(&conflict("report.docx", 1)));
        assert!(!rule.matches(&conflict("report.pdf", 1)));
        assert!(!rule.matches(&conflict("noext", 1)));
    }

    #[test]
    fn test_conflict_type_condition() {
        let mut config = rule_config("*", "keep_local");
        config.conditions.insert(
            "conflict_type".to_string(),
            serde_yaml::Value::String("both_modified".to_string()),
        );
        let rule = CompiledRule::compile(&config).unwrap();

        assert!(rule.matches(&conflict("a.txt", 1)));

        let mut other = conflict("a.txt", 1);
        other.kind = ConflictKind::DeleteModify;
        assert!(!rule.matches(&other));
    }

    #[test]
    fn test_size_conditions() {
        let mut config = rule_config("*", "skip");
        config.conditions.insert(
            "size_greater_than".to_string(),
            serde_yaml::Value::Number(100.into()),
        );
        config.conditions.insert(
            "size_less_than".to_string(),
            serde_yaml::Value::Number(1000.into()),
        );
        let rule = CompiledRule::compile(&config).unwrap();

        assert!(rule.matches(&conflict("a.bin", 500)));
        assert!(!rule.matches(&conflict("a.bin", 100)));
        assert!(!rule.matches(&conflict("a.bin", 1000)));
    }

    #[test]
    fn test_unknown_condition_ignored() {
        let mut config = rule_config("*", "keep_local");
        config.conditions.insert(
            "phase_of_moon".to_string(),
            serde_yaml::Value::String("full".to_string()),
        );
        let rule = CompiledRule::compile(&config).unwrap();
        assert!(rule.matches(&conflict("a.txt", 1)));
    }
}
