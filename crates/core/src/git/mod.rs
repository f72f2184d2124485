//! Git collaborators for upstream triage.
//!
//! The triage engine never talks to git directly. It depends on the
//! traits below, and [`GitClient`] implements all of them on top of `git2`.

pub mod client;

pub use client::GitClient;

use crate::classifier::{PathSet, WorkingTreeStatus};
use crate::errors::GitError;

/// Read access to revision history.
pub trait RepositoryHistory {
    /// Every path touched by a non-merge commit reachable from `to_ref` but
    /// not from `from_ref`.
    ///
    /// Only paths under `prefix` are returned, with the prefix stripped. An
    /// empty prefix selects the whole repository.
    fn list_changed_paths(
        &self,
        from_ref: &str,
        to_ref: &str,
        prefix: &str,
    ) -> Result<PathSet, GitError>;
}

/// Read access to the working tree.
pub trait WorkingTreeReader {
    /// Working-tree paths that are modified (`M`) or deleted (`D`) relative
    /// to `reference`. Every other status is ignored.
    fn list_working_tree_status(&self, reference: &str) -> Result<WorkingTreeStatus, GitError>;
}

/// Write access to the working tree.
pub trait WorkingTreeWriter {
    /// Force-checkout exactly `paths` from `reference` into the index and
    /// working tree, like `git checkout <reference> -- <paths>`. Paths are
    /// literal, never patterns.
    fn checkout_paths(&self, reference: &str, paths: &[String]) -> Result<(), GitError>;
}

/// Normalise a subdirectory prefix to `dir/sub/` form, or `""` for the root.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Strip a normalised prefix from `path`, returning `None` when the path
/// lies outside it.
pub fn strip_prefix<'a>(path: &'a str, normalized_prefix: &str) -> Option<&'a str> {
    if normalized_prefix.is_empty() {
        return Some(path);
    }
    path.strip_prefix(normalized_prefix).filter(|rest| !rest.is_empty())
}

/// Escape a path so libgit2 pathspec matching treats it literally.
pub fn escape_pathspec(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '\\' | '[' | ']' | '*' | '?') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
