//! Change classification.
//!
//! Given the paths the user touched in their own history and the working-tree
//! status against an upstream reference, the classifier partitions every
//! reported path into one of four outcome buckets. It is a pure function:
//! callers gather the inputs and act on the output.
//!
//! | Status | In user history | Bucket |
//! |--------|-----------------|--------|
//! | Deleted | yes | `deleted_by_user` (leave deleted) |
//! | Deleted | no | `missing_from_remote` (restore) |
//! | Modified | yes | `conflict` (manual review) |
//! | Modified | no | `safe_update` (overwrite) |
//!
//! All paths must be relative to the same root. A mismatch is not detected
//! and silently produces wrong buckets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A set of repository-relative, forward-slash separated paths.
pub type PathSet = BTreeSet<String>;

/// Working-tree status against a reference, restricted to `M` and `D`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingTreeStatus {
    /// Paths present locally whose content differs from the reference.
    pub modified: PathSet,
    /// Paths present in the reference but absent locally.
    pub deleted: PathSet,
}

impl WorkingTreeStatus {
    /// Paths reported as both modified and deleted.
    ///
    /// Well-formed status output never produces any.
    pub fn overlap(&self) -> PathSet {
        status_overlap(&self.modified, &self.deleted)
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// The four disjoint outcome buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Deleted locally and the user's history removed it. No action.
    pub deleted_by_user: PathSet,
    /// Deleted locally but never removed by the user. Restore.
    pub missing_from_remote: PathSet,
    /// Modified locally and present in the user's history. Review.
    pub conflict: PathSet,
    /// Modified locally but never touched by the user. Overwrite.
    pub safe_update: PathSet,
}

impl Classification {
    /// Paths to restore from the reference.
    pub fn to_restore(&self) -> &PathSet {
        &self.missing_from_remote
    }

    /// Paths to overwrite from the reference.
    pub fn to_overwrite(&self) -> &PathSet {
        &self.safe_update
    }

    /// Paths that need a human.
    pub fn to_review(&self) -> &PathSet {
        &self.conflict
    }

    /// Total number of bucket entries (a path counted once per bucket).
    pub fn len(&self) -> usize {
        self.deleted_by_user.len()
            + self.missing_from_remote.len()
            + self.conflict.len()
            + self.safe_update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition `modified ∪ deleted` using the user's change set.
///
/// Each rule is evaluated independently, so a path reported as both modified
/// and deleted lands in one deleted bucket and one modified bucket. Use
/// [`status_overlap`] to reject such input first.
pub fn classify(user_changes: &PathSet, modified: &PathSet, deleted: &PathSet) -> Classification {
    let (deleted_by_user, missing_from_remote) = split_by(deleted, user_changes);
    let (conflict, safe_update) = split_by(modified, user_changes);

    debug!(
        deleted_by_user = deleted_by_user.len(),
        missing_from_remote = missing_from_remote.len(),
        conflict = conflict.len(),
        safe_update = safe_update.len(),
        "classified working-tree changes"
    );

    Classification {
        deleted_by_user,
        missing_from_remote,
        conflict,
        safe_update,
    }
}

/// [`classify`] taking a [`WorkingTreeStatus`].
pub fn classify_status(user_changes: &PathSet, status: &WorkingTreeStatus) -> Classification {
    classify(user_changes, &status.modified, &status.deleted)
}

/// Paths present in both `modified` and `deleted`.
pub fn status_overlap(modified: &PathSet, deleted: &PathSet) -> PathSet {
    modified.intersection(deleted).cloned().collect()
}

/// Split `paths` into (`paths ∩ user`, `paths − user`).
fn split_by(paths: &PathSet, user_changes: &PathSet) -> (PathSet, PathSet) {
    paths
        .iter()
        .cloned()
        .partition(|path| user_changes.contains(path))
}
