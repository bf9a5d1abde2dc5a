use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("repo not found")]
    RepoNotFound,
    #[error("commit failed: {reason}")]
    CommitFailed { reason: String },
    #[error("diff failed: {reason}")]
    DiffFailed { reason: String },
    #[error("backend error: {reason}")]
    BackendError { reason: String },
}

/// A single staged path for [`VcsBackend::commit_paths`]. `Remove` drops the
/// entry from the tree; `Upsert` stages whatever currently exists on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedPath {
    Upsert(String),
    Remove(String),
}

impl StagedPath {
    pub fn path(&self) -> &str {
        match self {
            Self::Upsert(path) | Self::Remove(path) => path,
        }
    }
}

pub trait VcsBackend {
    /// Opens the repository at `repo_path`, initializing it first if none
    /// exists. Idempotent.
    fn ensure_repo(repo_path: &Path) -> Result<(), VcsError>;

    /// Hides `pattern` from the backend's untracked-file reporting. Backends
    /// without an ignore mechanism may ignore this.
    fn exclude_pattern(repo_path: &Path, pattern: &str) -> Result<(), VcsError> {
        let _ = (repo_path, pattern);
        Ok(())
    }

    fn head_commit(repo_path: &Path) -> Result<Option<String>, VcsError>;
    /// Stages exactly the given paths on top of the current HEAD tree and
    /// commits with `message`. Returns the new commit id.
    fn commit_paths(
        repo_path: &Path,
        staged: &[StagedPath],
        message: &str,
    ) -> Result<String, VcsError>;
}
