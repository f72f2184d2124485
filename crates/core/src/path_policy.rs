//! Path policy for triage side effects.
//!
//! [`PathPolicy`] holds the `ignore_patterns` from the `[triage]` config
//! section. Paths matching a pattern are never restored or overwritten, even
//! when the classifier marks them safe. They are reported as skipped.

use tracing::debug;

use crate::classifier::PathSet;

/// Evaluates candidate paths against ignore patterns.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    /// Glob patterns matched against the relative path.
    ignore_patterns: Vec<String>,
}

impl PathPolicy {
    pub fn new(ignore_patterns: Vec<String>) -> Self {
        Self { ignore_patterns }
    }

    /// The first pattern matching `rel_path`, if any.
    ///
    /// Supports `*`, `**`, `?`, `{a,b}` and character classes.
    pub fn matching_pattern(&self, rel_path: &str) -> Option<&str> {
        let path = rel_path.replace('\\', "/");
        self.ignore_patterns
            .iter()
            .find(|pattern| glob_match::glob_match(&pattern.replace('\\', "/"), &path))
            .map(String::as_str)
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.matching_pattern(rel_path).is_some()
    }

    /// Split `paths` into (allowed, ignored).
    pub fn partition(&self, paths: &PathSet) -> (PathSet, PathSet) {
        if self.ignore_patterns.is_empty() {
            return (paths.clone(), PathSet::new());
        }
        let (ignored, allowed): (PathSet, PathSet) = paths.iter().cloned().partition(|path| {
            match self.matching_pattern(path) {
                Some(pattern) => {
                    debug!(path = %path, pattern, "path matches ignore pattern");
                    true
                }
                None => false,
            }
        });
        (allowed, ignored)
    }

    pub fn has_constraints(&self) -> bool {
        !self.ignore_patterns.is_empty()
    }
}

impl From<&crate::config::TriageConfig> for PathPolicy {
    fn from(config: &crate::config::TriageConfig) -> Self {
        Self::new(config.ignore_patterns.clone())
    }
}
