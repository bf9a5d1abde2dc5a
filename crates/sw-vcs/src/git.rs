use crate::backend::{StagedPath, VcsBackend, VcsError};
use gix::ObjectId;
use gix::object::tree::EntryKind as ObjectEntryKind;
use std::path::Path;

pub struct GitBackend;

impl VcsBackend for GitBackend {
    fn ensure_repo(repo_path: &Path) -> Result<(), VcsError> {
        if repo_path.join(".git").exists() {
            open_repo(repo_path)?;
            return Ok(());
        }
        gix::init(repo_path).map_err(map_backend_error("init"))?;
        Ok(())
    }

    fn exclude_pattern(repo_path: &Path, pattern: &str) -> Result<(), VcsError> {
        ensure_excluded(repo_path, pattern)
    }

    fn head_commit(repo_path: &Path) -> Result<Option<String>, VcsError> {
        let repo = open_repo(repo_path)?;
        let head = repo.head().map_err(map_backend_error("head"))?;
        Ok(head.id().map(|id| id.to_string()))
    }

    fn commit_paths(
        repo_path: &Path,
        staged: &[StagedPath],
        message: &str,
    ) -> Result<String, VcsError> {
        let mut repo = open_repo(repo_path)?;
        // Commits must not depend on ambient git config; fall back to a fixed
        // identity when the host has none.
        if repo.committer().is_none() {
            let mut config = repo.config_snapshot_mut();
            config
                .set_raw_value(&"user.name", "steward")
                .map_err(map_backend_error("set committer"))?;
            config
                .set_raw_value(&"user.email", "steward@localhost")
                .map_err(map_backend_error("set committer"))?;
        }
        let workdir = repo.workdir().ok_or_else(|| VcsError::BackendError {
            reason: "bare repository".to_string(),
        })?;

        let parent = repo.head_commit().ok();
        let base_tree = match &parent {
            Some(commit) => commit
                .tree_id()
                .map_err(map_backend_error("head tree"))?
                .detach(),
            None => ObjectId::empty_tree(repo.object_hash()),
        };

        let mut editor = repo
            .edit_tree(base_tree)
            .map_err(map_backend_error("edit tree"))?;
        for entry in staged {
            match entry {
                StagedPath::Upsert(rel) => {
                    let file = workdir.join(rel);
                    let data = std::fs::read(&file).map_err(map_backend_error("read file"))?;
                    let blob_id = repo
                        .write_blob(&data)
                        .map_err(map_backend_error("write blob"))?;
                    let kind = if is_executable(&file)? {
                        ObjectEntryKind::BlobExecutable
                    } else {
                        ObjectEntryKind::Blob
                    };
                    editor
                        .upsert(rel.as_str(), kind, blob_id.detach())
                        .map_err(map_backend_error("update tree"))?;
                }
                StagedPath::Remove(rel) => {
                    editor
                        .remove(rel.as_str())
                        .map_err(map_backend_error("remove entry"))?;
                }
            }
        }
        let tree_id = editor
            .write()
            .map_err(map_backend_error("write tree"))?
            .detach();

        let parents: Vec<ObjectId> = parent.iter().map(|commit| commit.id).collect();
        let commit_id = repo
            .commit("HEAD", message, tree_id, parents)
            .map_err(|err| VcsError::CommitFailed {
                reason: err.to_string(),
            })?;
        Ok(commit_id.to_string())
    }
}

/// Adds `pattern` to `.git/info/exclude` so governance bookkeeping never
/// shows up as untracked. Idempotent.
pub fn ensure_excluded(repo_path: &Path, pattern: &str) -> Result<(), VcsError> {
    let info_dir = repo_path.join(".git").join("info");
    std::fs::create_dir_all(&info_dir).map_err(map_backend_error("exclude dir"))?;
    let exclude = info_dir.join("exclude");
    let existing = match std::fs::read_to_string(&exclude) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(map_backend_error("read exclude")(err)),
    };
    if existing.lines().any(|line| line.trim() == pattern) {
        return Ok(());
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(pattern);
    updated.push('\n');
    std::fs::write(&exclude, updated).map_err(map_backend_error("write exclude"))
}

fn open_repo(repo_path: &Path) -> Result<gix::Repository, VcsError> {
    gix::open(repo_path).map_err(|_| VcsError::RepoNotFound)
}

fn map_backend_error<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> VcsError {
    move |err| VcsError::BackendError {
        reason: format!("{context}: {err}"),
    }
}

fn is_executable(path: &Path) -> Result<bool, VcsError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        let metadata = std::fs::metadata(path).map_err(map_backend_error("metadata"))?;
        Ok(metadata.permissions().mode() & 0o111 != 0)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(false)
    }
}
