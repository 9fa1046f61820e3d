//! Ignore pattern matching
//!
//! Decides whether a path is excluded from watching and syncing. A default
//! set of editor/system artifacts always matches; user rules are
//! `.gitignore`-style (leading `!` negation, trailing `/` directory-only)
//! and are evaluated in order with the last match winning.

use std::path::Path;

use glob::Pattern;
use tracing::warn;

/// Names always ignored, regardless of user rules
const DEFAULT_IGNORES: &[&str] = &[
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    ".git",
    ".svn",
    ".hg",
    ".idea",
    ".vscode",
    "node_modules",
    "__pycache__",
    "*.pyc",
    "*.pyo",
    "*.swp",
    "*.swo",
    "*~",
    "#*#",
    ".#*",
];

/// A single ignore rule
#[derive(Debug, Clone)]
struct Rule {
    raw: String,
    compiled: Option<Pattern>,
    is_negation: bool,
    dir_only: bool,
}

/// Gitignore-style path matcher with built-in defaults
#[derive(Debug, Default, Clone)]
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
}

impl IgnoreMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a matcher from a list of patterns
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::new();
        matcher.add_patterns(patterns);
        matcher
    }

    /// Adds multiple patterns, in order
    pub fn add_patterns<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.add_pattern(pattern.as_ref());
        }
    }

    /// Adds a single pattern; blank lines and `#` comments are skipped
    pub fn add_pattern(&mut self, pattern: &str) {
        let trimmed = pattern.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return;
        }

        let (is_negation, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (dir_only, body) = match body.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, body),
        };

        let compiled = Pattern::new(body).ok();
        if compiled.is_none() {
            warn!(pattern = %body, "Ignore pattern is not a valid glob, falling back to literal matching");
        }

        self.rules.push(Rule {
            raw: body.to_string(),
            compiled,
            is_negation,
            dir_only,
        });
    }

    /// Loads patterns from a `.gitignore`-style file
    ///
    /// A missing file is not an error.
    pub fn load_from_file(&mut self, path: &Path) -> std::io::Result<()> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        for line in content.lines() {
            self.add_pattern(line);
        }
        Ok(())
    }

    /// Returns the configured patterns in their original textual form
    pub fn patterns(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|rule| {
                let mut s = String::new();
                if rule.is_negation {
                    s.push('!');
                }
                s.push_str(&rule.raw);
                if rule.dir_only {
                    s.push('/');
                }
                s
            })
            .collect()
    }

    /// Decides whether `path` is ignored
    ///
    /// The default set matches unconditionally; user rules then toggle the
    /// decision in order (negated rules clear it). Directory-only rules are
    /// skipped for files.
    pub fn should_ignore(&self, path: &Path, is_directory: bool) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        let basename = Path::new(&normalized)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if is_default_ignored(&basename) {
            return true;
        }

        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_only && !is_directory {
                continue;
            }
            if rule_matches(rule, &normalized, &basename) {
                ignored = !rule.is_negation;
            }
        }
        ignored
    }
}

/// Tries the match attempts in contract order: glob against basename, glob
/// against the full path, substring of the path, exact basename, then
/// glob/exact against each path segment.
fn rule_matches(rule: &Rule, path: &str, basename: &str) -> bool {
    if let Some(pattern) = &rule.compiled {
        if pattern.matches(basename) || pattern.matches(path) {
            return true;
        }
    }

    if path.contains(&rule.raw) {
        return true;
    }

    if basename == rule.raw {
        return true;
    }

    for segment in path.split('/') {
        if segment == rule.raw {
            return true;
        }
        if let Some(pattern) = &rule.compiled {
            if pattern.matches(segment) {
                return true;
            }
        }
    }

    false
}

fn is_default_ignored(basename: &str) -> bool {
    for pattern in DEFAULT_IGNORES {
        if let Ok(p) = Pattern::new(pattern) {
            if p.matches(basename) {
                return true;
            }
        }
    }

    // Editor temp files like `.report.docx.tmp`
    basename.starts_with('.') && basename.ends_with(".tmp")
}
