//! Local Git repository operations via `git2`.

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{Commit, Delta, DiffDelta, DiffOptions, Repository};
use tracing::{debug, info, instrument, warn};

use super::{
    escape_pathspec, normalize_prefix, strip_prefix, RepositoryHistory, WorkingTreeReader,
    WorkingTreeWriter,
};
use crate::classifier::{PathSet, WorkingTreeStatus};
use crate::errors::GitError;

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Resolve any revision expression to a commit.
    pub fn resolve_commit(&self, reference: &str) -> Result<Commit<'_>, GitError> {
        self.repo
            .revparse_single(reference)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| GitError::RefNotFound(reference.to_string()))
    }

    /// Return the SHA a reference resolves to.
    pub fn resolve_sha(&self, reference: &str) -> Result<String, GitError> {
        Ok(self.resolve_commit(reference)?.id().to_string())
    }

    fn require_workdir(&self) -> Result<(), GitError> {
        if self.repo.workdir().is_none() {
            return Err(GitError::BareRepository(self.repo_path.display().to_string()));
        }
        Ok(())
    }
}

impl RepositoryHistory for GitClient {
    #[instrument(skip(self), fields(repo = %self.repo_path.display()))]
    fn list_changed_paths(
        &self,
        from_ref: &str,
        to_ref: &str,
        prefix: &str,
    ) -> Result<PathSet, GitError> {
        let from = self.resolve_commit(from_ref)?;
        let to = self.resolve_commit(to_ref)?;
        let prefix = normalize_prefix(prefix);

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(to.id())?;
        revwalk.hide(from.id())?;

        let mut paths = PathSet::new();
        let mut commits = 0usize;
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            // Merge commits carry no changes of their own.
            if commit.parent_count() > 1 {
                debug!(sha = %commit.id(), "skipping merge commit");
                continue;
            }
            commits += 1;

            let tree = commit.tree()?;
            let parent_tree = match commit.parent_count() {
                0 => None,
                _ => Some(commit.parent(0)?.tree()?),
            };
            let mut opts = DiffOptions::new();
            let diff =
                self.repo
                    .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

            for delta in diff.deltas() {
                for path in delta_paths(&delta)? {
                    if let Some(rel) = strip_prefix(&path, &prefix) {
                        paths.insert(rel.to_string());
                    }
                }
            }
        }

        info!(commits, paths = paths.len(), "collected user change set");
        Ok(paths)
    }
}

impl WorkingTreeReader for GitClient {
    #[instrument(skip(self), fields(repo = %self.repo_path.display()))]
    fn list_working_tree_status(&self, reference: &str) -> Result<WorkingTreeStatus, GitError> {
        self.require_workdir()?;
        let tree = self.resolve_commit(reference)?.tree()?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(false).include_typechange(true);
        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))?;

        let mut status = WorkingTreeStatus::default();
        for delta in diff.deltas() {
            match delta.status() {
                Delta::Modified => {
                    status.modified.insert(delta_path(delta.new_file().path())?);
                }
                Delta::Deleted => {
                    status.deleted.insert(delta_path(delta.old_file().path())?);
                }
                other => {
                    debug!(?other, path = ?delta.new_file().path(), "ignoring status");
                }
            }
        }

        info!(
            modified = status.modified.len(),
            deleted = status.deleted.len(),
            "collected working-tree status"
        );
        Ok(status)
    }
}

impl WorkingTreeWriter for GitClient {
    #[instrument(skip(self, paths), fields(repo = %self.repo_path.display(), count = paths.len()))]
    fn checkout_paths(&self, reference: &str, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        self.require_workdir()?;
        let tree = self.resolve_commit(reference)?.tree()?;

        // libgit2 treats checkout paths as fnmatch patterns, so `[id].js`
        // would also match `i.js` unless escaped.
        let mut builder = CheckoutBuilder::new();
        builder.force();
        for path in paths {
            builder.path(escape_pathspec(path));
        }

        self.repo
            .checkout_tree(tree.as_object(), Some(&mut builder))
            .map_err(|e| {
                warn!(reference, error = %e, "checkout failed");
                GitError::CheckoutFailed {
                    reference: reference.to_string(),
                    count: paths.len(),
                    detail: e.message().to_string(),
                }
            })?;

        debug!(reference, count = paths.len(), "checked out paths");
        Ok(())
    }
}

/// Both sides of a delta. Without rename detection they are the same path.
fn delta_paths(delta: &DiffDelta<'_>) -> Result<Vec<String>, GitError> {
    let mut out = Vec::with_capacity(2);
    for file in [delta.old_file(), delta.new_file()] {
        if file.path().is_none() {
            continue;
        }
        let path = delta_path(file.path())?;
        if !out.contains(&path) {
            out.push(path);
        }
    }
    Ok(out)
}

fn delta_path(path: Option<&Path>) -> Result<String, GitError> {
    let path = path.ok_or_else(|| GitError::NonUtf8Path("<missing>".into()))?;
    path.to_str()
        .map(|s| s.replace('\\', "/"))
        .ok_or_else(|| GitError::NonUtf8Path(path.display().to_string()))
}
