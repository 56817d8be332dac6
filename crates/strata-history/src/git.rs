//! Version-control access through libgit2

use git2::build::CheckoutBuilder;
use git2::{Commit, Oid, Repository, StatusOptions};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use strata_core::CommitInfo;
use thiserror::Error;

/// Failures that abort the current pipeline stage.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Failed to open git repository at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("Repository at {0} has no working directory")]
    Bare(PathBuf),

    #[error("Cannot resolve reference `{reference}`")]
    UnresolvedReference { reference: String },

    #[error("Parent of {commit} is not available (shallow history?)")]
    MissingParent { commit: String },

    #[error("Working tree has uncommitted changes, refusing to check out `{reference}`: {}", files.join(", "))]
    DirtyWorkingTree { reference: String, files: Vec<String> },

    #[error("Checkout of `{reference}` failed: {source}")]
    Checkout {
        reference: String,
        #[source]
        source: git2::Error,
    },

    #[error("Invalid stale-artifact pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Failed to remove stale artifact {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// Linear history, commit metadata and checkout of one repository.
pub trait VersionControl {
    /// Root of the checked-out tree.
    fn workdir(&self) -> &Path;

    /// Metadata of any resolvable reference.
    fn info(&self, reference: &str) -> Result<CommitInfo, RepositoryError>;

    /// First parent, `None` for a root commit.
    fn parent(&self, commit: &str) -> Result<Option<CommitInfo>, RepositoryError>;

    /// Up to `depth` first-parent commits ending at `head`, oldest first.
    fn linear_history(&self, head: &str, depth: usize) -> Result<Vec<CommitInfo>, RepositoryError>;

    /// Paths touched by `commit` relative to its first parent.
    fn changed_files(&self, commit: &str) -> Result<Vec<String>, RepositoryError>;

    /// Materialize `reference` in the working tree.
    fn checkout(&self, reference: &str) -> Result<(), RepositoryError>;

    /// Return to the HEAD checked out when the repository was opened.
    fn restore(&self) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone)]
enum OriginalHead {
    Branch(String),
    Detached(Oid),
}

/// [`VersionControl`] backed by a local git repository.
pub struct GitRepository {
    repo: Repository,
    workdir: PathBuf,
    original: OriginalHead,
    stale_artifacts: Option<GlobSet>,
    moved: Cell<bool>,
}

impl GitRepository {
    /// Open the repository containing `path`.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let repo = Repository::discover(path).map_err(|source| RepositoryError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| RepositoryError::Bare(repo.path().to_path_buf()))?
            .to_path_buf();

        let original = {
            let head = repo.head().map_err(|_| RepositoryError::UnresolvedReference {
                reference: "HEAD".to_string(),
            })?;
            match (head.is_branch(), head.name(), head.target()) {
                (true, Some(name), _) => OriginalHead::Branch(name.to_string()),
                (_, _, Some(oid)) => OriginalHead::Detached(oid),
                _ => {
                    return Err(RepositoryError::UnresolvedReference {
                        reference: "HEAD".to_string(),
                    })
                }
            }
        };
        tracing::debug!("Opened git repository at {} ({:?})", workdir.display(), original);

        Ok(GitRepository {
            repo,
            workdir,
            original,
            stale_artifacts: None,
            moved: Cell::new(false),
        })
    }

    /// Untracked or ignored files matching these globs are deleted before each checkout.
    pub fn with_stale_artifacts(mut self, patterns: &[String]) -> Result<Self, RepositoryError> {
        if patterns.is_empty() {
            self.stale_artifacts = None;
            return Ok(self);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|source| RepositoryError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| RepositoryError::Pattern {
            pattern: patterns.join(","),
            source,
        })?;
        self.stale_artifacts = Some(set);
        Ok(self)
    }

    fn resolve(&self, reference: &str) -> Result<Commit<'_>, RepositoryError> {
        self.repo
            .revparse_single(reference)
            .and_then(|object| object.peel_to_commit())
            .map_err(|_| RepositoryError::UnresolvedReference {
                reference: reference.to_string(),
            })
    }

    /// Tracked changes and untracked files, ignoring anything `.gitignore` covers.
    pub fn dirty_files(&self) -> Result<Vec<String>, RepositoryError> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(statuses
            .iter()
            .filter(|entry| !entry.status().is_ignored())
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect())
    }

    /// Delete untracked or ignored files matching the stale-artifact globs.
    pub fn cleanup_stale_artifacts(&self) -> Result<usize, RepositoryError> {
        let Some(globs) = &self.stale_artifacts else {
            return Ok(0);
        };
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(true)
            .recurse_ignored_dirs(true);
        let statuses = self.repo.statuses(Some(&mut options))?;

        let mut removed = 0;
        for entry in statuses.iter() {
            let status = entry.status();
            if !(status.is_wt_new() || status.is_ignored()) {
                continue;
            }
            let Some(relative) = entry.path() else { continue };
            if !globs.is_match(relative) {
                continue;
            }
            let path = self.workdir.join(relative);
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(RepositoryError::Cleanup { path, source }),
            }
        }
        if removed > 0 {
            tracing::debug!("Removed {} stale artifacts", removed);
        }
        Ok(removed)
    }

    fn checkout_commit(&self, reference: &str, commit: &Commit<'_>) -> Result<(), RepositoryError> {
        let mut options = CheckoutBuilder::new();
        options.safe();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut options))
            .map_err(|source| RepositoryError::Checkout {
                reference: reference.to_string(),
                source,
            })
    }
}

fn commit_info(commit: &Commit<'_>) -> CommitInfo {
    CommitInfo::new(commit.id().to_string(), commit.time().seconds())
        .with_message(commit.summary().unwrap_or_default())
        .with_author(commit.author().name().unwrap_or("unknown"))
}

impl VersionControl for GitRepository {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn info(&self, reference: &str) -> Result<CommitInfo, RepositoryError> {
        Ok(commit_info(&self.resolve(reference)?))
    }

    fn parent(&self, commit: &str) -> Result<Option<CommitInfo>, RepositoryError> {
        let resolved = self.resolve(commit)?;
        if resolved.parent_count() == 0 {
            return Ok(None);
        }
        let parent = resolved.parent(0).map_err(|_| RepositoryError::MissingParent {
            commit: commit.to_string(),
        })?;
        Ok(Some(commit_info(&parent)))
    }

    fn linear_history(&self, head: &str, depth: usize) -> Result<Vec<CommitInfo>, RepositoryError> {
        let mut current = self.resolve(head)?;
        let mut history = vec![commit_info(&current)];
        while history.len() < depth.max(1) {
            match current.parent(0) {
                Ok(parent) => {
                    history.push(commit_info(&parent));
                    current = parent;
                }
                Err(_) => break,
            }
        }
        history.reverse();
        Ok(history)
    }

    fn changed_files(&self, commit: &str) -> Result<Vec<String>, RepositoryError> {
        let resolved = self.resolve(commit)?;
        let tree = resolved.tree()?;
        let parent_tree = resolved.parent(0).ok().map(|p| p.tree()).transpose()?;
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut files: Vec<String> = diff
            .deltas()
            .filter_map(|delta| delta.new_file().path().or_else(|| delta.old_file().path()))
            .map(|path| path.to_string_lossy().replace('\\', "/"))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn checkout(&self, reference: &str) -> Result<(), RepositoryError> {
        self.cleanup_stale_artifacts()?;
        let dirty = self.dirty_files()?;
        if !dirty.is_empty() {
            return Err(RepositoryError::DirtyWorkingTree {
                reference: reference.to_string(),
                files: dirty,
            });
        }

        let commit = self.resolve(reference)?;
        self.checkout_commit(reference, &commit)?;
        self.repo.set_head_detached(commit.id())?;
        self.moved.set(true);
        tracing::info!("Checked out {} ({})", reference, strata_core::model::short_id(&commit.id().to_string()));
        Ok(())
    }

    fn restore(&self) -> Result<(), RepositoryError> {
        if !self.moved.get() {
            return Ok(());
        }
        self.cleanup_stale_artifacts()?;
        match &self.original {
            OriginalHead::Branch(name) => {
                let commit = self
                    .repo
                    .find_reference(name)
                    .and_then(|r| r.peel_to_commit())
                    .map_err(|_| RepositoryError::UnresolvedReference {
                        reference: name.clone(),
                    })?;
                self.checkout_commit(name, &commit)?;
                self.repo.set_head(name)?;
            }
            OriginalHead::Detached(oid) => {
                let reference = oid.to_string();
                let commit = self.resolve(&reference)?;
                self.checkout_commit(&reference, &commit)?;
                self.repo.set_head_detached(*oid)?;
            }
        }
        self.moved.set(false);
        tracing::info!("Restored original HEAD");
        Ok(())
    }
}
