//! Upstream triage engine.
//!
//! The [`TriageEngine`] reconciles a local working tree against an upstream
//! reference in two phases:
//!
//! 1. **Plan**: read the user's change set from history and the working-tree
//!    status against the target, reject overlapping status, classify, and
//!    hold back paths matching an ignore pattern.
//! 2. **Apply**: restore paths missing from the working tree, then overwrite
//!    safe updates, in batches. Conflicts are only reported.
//!
//! Classification never interleaves with side effects. A failed checkout
//! aborts the run and is surfaced as-is.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{classify_status, Classification, PathSet};
use crate::config::TriageConfig;
use crate::errors::TriageError;
use crate::git::{RepositoryHistory, WorkingTreeReader, WorkingTreeWriter};
use crate::path_policy::PathPolicy;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// References and knobs for one triage run.
#[derive(Debug, Clone)]
pub struct TriageSettings {
    pub base_ref: String,
    pub head_ref: String,
    pub target_ref: String,
    pub prefix: String,
    pub batch_size: usize,
    pub policy: PathPolicy,
}

impl From<&TriageConfig> for TriageSettings {
    fn from(config: &TriageConfig) -> Self {
        Self {
            base_ref: config.base_ref.clone(),
            head_ref: config.head_ref.clone(),
            target_ref: config.target_ref.clone(),
            prefix: config.prefix.clone(),
            batch_size: config.batch_size,
            policy: PathPolicy::from(config),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan & report
// ---------------------------------------------------------------------------

/// The outcome of the planning phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriagePlan {
    pub base_ref: String,
    pub head_ref: String,
    pub target_ref: String,
    pub prefix: String,
    /// Number of paths in the user's change set.
    pub user_change_count: usize,
    /// Raw classifier output.
    pub classification: Classification,
    /// Paths that will be restored.
    pub to_restore: PathSet,
    /// Paths that will be overwritten.
    pub to_overwrite: PathSet,
    /// Paths the classifier marked safe but an ignore pattern held back.
    pub skipped_by_policy: PathSet,
}

impl TriagePlan {
    pub fn to_review(&self) -> &PathSet {
        self.classification.to_review()
    }

    pub fn left_deleted(&self) -> &PathSet {
        &self.classification.deleted_by_user
    }

    /// `true` if applying would write nothing and nothing needs review.
    pub fn is_noop(&self) -> bool {
        self.to_restore.is_empty() && self.to_overwrite.is_empty() && self.to_review().is_empty()
    }
}

/// What a side-effect batch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageAction {
    Restore,
    Overwrite,
}

impl std::fmt::Display for TriageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restore => write!(f, "restore"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Progress notification emitted after every batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageProgress {
    pub action: TriageAction,
    /// Paths handled so far across both actions.
    pub done: usize,
    /// Paths to handle across both actions.
    pub total: usize,
}

/// What a triage run actually did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageReport {
    pub dry_run: bool,
    pub restored: Vec<String>,
    pub overwritten: Vec<String>,
    pub to_review: Vec<String>,
    pub left_deleted: Vec<String>,
    pub skipped_by_policy: Vec<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl TriageReport {
    pub fn has_conflicts(&self) -> bool {
        !self.to_review.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Reconciles a working tree against an upstream reference.
///
/// `H` answers history queries for the user's change set; `W` is the
/// working tree being reconciled.
pub struct TriageEngine<H, W> {
    history: H,
    worktree: W,
    settings: TriageSettings,
}

impl<H, W> TriageEngine<H, W>
where
    H: RepositoryHistory,
    W: WorkingTreeReader + WorkingTreeWriter,
{
    /// Create a new engine. Fails if `batch_size` is zero.
    pub fn new(history: H, worktree: W, settings: TriageSettings) -> Result<Self, TriageError> {
        if settings.batch_size == 0 {
            return Err(TriageError::InvalidSetting {
                field: "batch_size".into(),
                detail: "must be > 0".into(),
            });
        }
        info!(
            base_ref = %settings.base_ref,
            target_ref = %settings.target_ref,
            prefix = %settings.prefix,
            "initializing triage engine"
        );
        Ok(Self {
            history,
            worktree,
            settings,
        })
    }

    pub fn settings(&self) -> &TriageSettings {
        &self.settings
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn worktree(&self) -> &W {
        &self.worktree
    }

    /// Gather inputs and classify. Writes nothing.
    pub fn plan(&self) -> Result<TriagePlan, TriageError> {
        let s = &self.settings;

        let user_changes =
            self.history
                .list_changed_paths(&s.base_ref, &s.head_ref, &s.prefix)?;
        let status = self.worktree.list_working_tree_status(&s.target_ref)?;

        let overlap = status.overlap();
        if !overlap.is_empty() {
            warn!(count = overlap.len(), "status reports paths both modified and deleted");
            return Err(TriageError::OverlappingStatus {
                paths: overlap.into_iter().collect(),
            });
        }

        let classification = classify_status(&user_changes, &status);
        let (to_restore, skipped_restore) = s.policy.partition(classification.to_restore());
        let (to_overwrite, skipped_overwrite) = s.policy.partition(classification.to_overwrite());
        let skipped_by_policy: PathSet = skipped_restore.into_iter().chain(skipped_overwrite).collect();

        info!(
            user_changes = user_changes.len(),
            restore = to_restore.len(),
            overwrite = to_overwrite.len(),
            review = classification.conflict.len(),
            left_deleted = classification.deleted_by_user.len(),
            skipped = skipped_by_policy.len(),
            "triage plan ready"
        );

        Ok(TriagePlan {
            base_ref: s.base_ref.clone(),
            head_ref: s.head_ref.clone(),
            target_ref: s.target_ref.clone(),
            prefix: s.prefix.clone(),
            user_change_count: user_changes.len(),
            classification,
            to_restore,
            to_overwrite,
            skipped_by_policy,
        })
    }

    /// Carry out a plan. With `dry_run` nothing is written.
    pub fn apply(
        &self,
        plan: &TriagePlan,
        dry_run: bool,
        progress: &mut dyn FnMut(TriageProgress),
    ) -> Result<TriageReport, TriageError> {
        let started_at = Utc::now().to_rfc3339();
        let total = plan.to_restore.len() + plan.to_overwrite.len();
        let mut done = 0usize;

        let restored = self.run_batches(
            TriageAction::Restore,
            &plan.to_restore,
            &plan.target_ref,
            dry_run,
            (&mut done, total),
            progress,
        )?;
        let overwritten = self.run_batches(
            TriageAction::Overwrite,
            &plan.to_overwrite,
            &plan.target_ref,
            dry_run,
            (&mut done, total),
            progress,
        )?;

        for path in plan.to_review() {
            debug!(path = %path, "left for manual review");
        }

        info!(
            dry_run,
            restored = restored.len(),
            overwritten = overwritten.len(),
            to_review = plan.to_review().len(),
            "triage applied"
        );

        Ok(TriageReport {
            dry_run,
            restored,
            overwritten,
            to_review: plan.to_review().iter().cloned().collect(),
            left_deleted: plan.left_deleted().iter().cloned().collect(),
            skipped_by_policy: plan.skipped_by_policy.iter().cloned().collect(),
            started_at,
            completed_at: Some(Utc::now().to_rfc3339()),
        })
    }

    /// Plan and apply in one call.
    pub fn run(&self, dry_run: bool) -> Result<TriageReport, TriageError> {
        let plan = self.plan()?;
        self.apply(&plan, dry_run, &mut |_| {})
    }

    fn run_batches(
        &self,
        action: TriageAction,
        paths: &PathSet,
        reference: &str,
        dry_run: bool,
        (done, total): (&mut usize, usize),
        progress: &mut dyn FnMut(TriageProgress),
    ) -> Result<Vec<String>, TriageError> {
        let paths: Vec<String> = paths.iter().cloned().collect();
        for (index, batch) in paths.chunks(self.settings.batch_size).enumerate() {
            debug!(%action, batch = index, size = batch.len(), dry_run, "applying batch");
            if !dry_run {
                self.worktree.checkout_paths(reference, batch)?;
            }
            *done += batch.len();
            progress(TriageProgress {
                action,
                done: *done,
                total,
            });
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::classifier::WorkingTreeStatus;
    use crate::errors::GitError;

    fn set(paths: &[&str]) -> PathSet {
        paths.iter().map(|p| p.to_string()).collect()
    }

    struct FakeHistory(PathSet);

    impl RepositoryHistory for FakeHistory {
        fn list_changed_paths(&self, _: &str, _: &str, _: &str) -> Result<PathSet, GitError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct FakeWorktree {
        status: WorkingTreeStatus,
        checkouts: RefCell<Vec<(String, Vec<String>)>>,
        fail: bool,
    }

    impl WorkingTreeReader for FakeWorktree {
        fn list_working_tree_status(&self, _: &str) -> Result<WorkingTreeStatus, GitError> {
            Ok(self.status.clone())
        }
    }

    impl WorkingTreeWriter for FakeWorktree {
        fn checkout_paths(&self, reference: &str, paths: &[String]) -> Result<(), GitError> {
            if self.fail {
                return Err(GitError::CheckoutFailed {
                    reference: reference.into(),
                    count: paths.len(),
                    detail: "boom".into(),
                });
            }
            self.checkouts
                .borrow_mut()
                .push((reference.to_string(), paths.to_vec()));
            Ok(())
        }
    }

    fn settings(batch_size: usize, ignore: &[&str]) -> TriageSettings {
        TriageSettings {
            base_ref: "base".into(),
            head_ref: "HEAD".into(),
            target_ref: "origin/main".into(),
            prefix: String::new(),
            batch_size,
            policy: PathPolicy::new(ignore.iter().map(|p| p.to_string()).collect()),
        }
    }

    fn engine(
        user: &[&str],
        modified: &[&str],
        deleted: &[&str],
        batch_size: usize,
        ignore: &[&str],
    ) -> TriageEngine<FakeHistory, FakeWorktree> {
        let worktree = FakeWorktree {
            status: WorkingTreeStatus {
                modified: set(modified),
                deleted: set(deleted),
            },
            ..Default::default()
        };
        TriageEngine::new(FakeHistory(set(user)), worktree, settings(batch_size, ignore)).unwrap()
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = TriageEngine::new(
            FakeHistory(PathSet::new()),
            FakeWorktree::default(),
            settings(0, &[]),
        );
        assert!(matches!(result, Err(TriageError::InvalidSetting { .. })));
    }

    #[test]
    fn test_plan_buckets() {
        let e = engine(&["mine.js", "gone.js"], &["mine.js", "theirs.js"], &["gone.js", "lost.js"], 10, &[]);
        let plan = e.plan().unwrap();
        assert_eq!(plan.user_change_count, 2);
        assert_eq!(plan.to_restore, set(&["lost.js"]));
        assert_eq!(plan.to_overwrite, set(&["theirs.js"]));
        assert_eq!(plan.to_review(), &set(&["mine.js"]));
        assert_eq!(plan.left_deleted(), &set(&["gone.js"]));
        assert!(!plan.is_noop());
    }

    #[test]
    fn test_overlap_rejected_before_any_write() {
        let e = engine(&[], &["p"], &["p"], 10, &[]);
        let err = e.plan().unwrap_err();
        assert!(matches!(err, TriageError::OverlappingStatus { ref paths } if paths == &["p"]));
        assert!(e.worktree().checkouts.borrow().is_empty());
    }

    #[test]
    fn test_ignore_patterns_hold_back_writes() {
        let e = engine(&[], &["yarn.lock", "a.js"], &["b.lock"], 10, &["*.lock"]);
        let plan = e.plan().unwrap();
        assert_eq!(plan.to_overwrite, set(&["a.js"]));
        assert!(plan.to_restore.is_empty());
        assert_eq!(plan.skipped_by_policy, set(&["b.lock", "yarn.lock"]));
        // The raw classification is untouched.
        assert_eq!(plan.classification.safe_update, set(&["a.js", "yarn.lock"]));
    }

    #[test]
    fn test_apply_batches_restore_then_overwrite() {
        let e = engine(&[], &["m1", "m2", "m3"], &["d1", "d2"], 2, &[]);
        let plan = e.plan().unwrap();
        let mut events = Vec::new();
        let report = e.apply(&plan, false, &mut |p| events.push(p)).unwrap();

        let checkouts = e.worktree().checkouts.borrow();
        let batches: Vec<Vec<String>> = checkouts.iter().map(|(_, b)| b.clone()).collect();
        assert_eq!(
            batches,
            vec![
                vec!["d1".to_string(), "d2".to_string()],
                vec!["m1".to_string(), "m2".to_string()],
                vec!["m3".to_string()],
            ]
        );
        assert!(checkouts.iter().all(|(r, _)| r == "origin/main"));

        assert_eq!(report.restored, vec!["d1", "d2"]);
        assert_eq!(report.overwritten, vec!["m1", "m2", "m3"]);
        assert!(!report.dry_run);
        assert!(report.completed_at.is_some());

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].action, TriageAction::Restore);
        assert_eq!(events.last().unwrap().done, 5);
        assert!(events.iter().all(|p| p.total == 5));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let e = engine(&["c"], &["c", "s"], &["r"], 10, &[]);
        let report = e.run(true).unwrap();
        assert!(e.worktree().checkouts.borrow().is_empty());
        assert!(report.dry_run);
        assert_eq!(report.restored, vec!["r"]);
        assert_eq!(report.overwritten, vec!["s"]);
        assert_eq!(report.to_review, vec!["c"]);
        assert!(report.has_conflicts());
    }

    #[test]
    fn test_checkout_failure_surfaces() {
        let mut e = engine(&[], &["m"], &[], 10, &[]);
        e.worktree.fail = true;
        let err = e.run(false).unwrap_err();
        assert!(matches!(
            err,
            TriageError::GitError(GitError::CheckoutFailed { .. })
        ));
    }

    #[test]
    fn test_plan_and_report_serialize() {
        let e = engine(&["c"], &["c", "s"], &["r"], 10, &[]);
        let plan = e.plan().unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["classification"]["conflict"], serde_json::json!(["c"]));
        assert_eq!(json["to_restore"], serde_json::json!(["r"]));

        let report = e.apply(&plan, true, &mut |_| {}).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dry_run"], serde_json::json!(true));
        assert_eq!(json["overwritten"], serde_json::json!(["s"]));
    }

    #[test]
    fn test_clean_tree_is_noop() {
        let e = engine(&["a"], &[], &[], 10, &[]);
        let plan = e.plan().unwrap();
        assert!(plan.is_noop());
        let report = e.apply(&plan, false, &mut |_| panic!("no batches expected")).unwrap();
        assert!(report.restored.is_empty());
        assert!(!report.has_conflicts());
    }
}
