//! Applies an approved change to the working tree and commits it.
//!
//! The tree is mutated only after both approvals are on record. Every
//! mutation carries a revert plan: if post-image verification or the commit
//! fails, the tree is restored to its pre-apply content before the error
//! surfaces.

use crate::analyze::{resolve, sha256_hex};
use crate::error::ApplyError;
use crate::types::enums::OperationKind;
use crate::types::ChangeOperation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use sw_vcs::backend::StagedPath;
use sw_vcs::VcsBackend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub commit: String,
    /// Repo-relative paths the commit touched.
    pub paths: Vec<String>,
}

/// What to undo if the apply fails after mutating the tree.
enum Revert {
    RemoveCreated(PathBuf),
    RestoreContent { path: PathBuf, content: String },
    MoveBack { from: PathBuf, to: PathBuf },
}

impl Revert {
    fn run(self) {
        let outcome = match self {
            Self::RemoveCreated(path) => fs::remove_file(&path),
            Self::RestoreContent { path, content } => fs::write(&path, content),
            Self::MoveBack { from, to } => fs::rename(&from, &to),
        };
        if let Err(err) = outcome {
            log::error!("revert step failed, tree may need manual repair: {err}");
        }
    }
}

pub fn apply_change<B: VcsBackend>(
    repo_root: &Path,
    operation: &ChangeOperation,
    post_content: Option<&str>,
    commit_message: &str,
) -> Result<ApplyResult, ApplyError> {
    B::ensure_repo(repo_root)?;
    B::exclude_pattern(repo_root, ".steward/")?;

    let source_abs = resolve(repo_root, &operation.source_path).map_err(|_| ApplyError::Io {
        path: operation.source_path.clone(),
        message: "path escapes the repository root".to_string(),
    })?;

    verify_base(operation, &source_abs)?;

    let mut reverts: Vec<Revert> = Vec::new();
    let staged = match mutate(repo_root, operation, post_content, &source_abs, &mut reverts) {
        Ok(staged) => staged,
        Err(err) => {
            run_reverts(reverts);
            return Err(err);
        }
    };

    match B::commit_paths(repo_root, &staged, commit_message) {
        Ok(commit) => Ok(ApplyResult {
            commit,
            paths: staged.iter().map(|path| path.path().to_string()).collect(),
        }),
        Err(err) => {
            run_reverts(reverts);
            Err(err.into())
        }
    }
}

/// The working tree may have moved since apply-approval was granted; the
/// approved diff only holds for the exact base it was computed against.
fn verify_base(operation: &ChangeOperation, source_abs: &Path) -> Result<(), ApplyError> {
    match operation.kind {
        OperationKind::Create => {
            if source_abs.exists() {
                return Err(ApplyError::TargetExists {
                    path: operation.source_path.clone(),
                });
            }
        }
        OperationKind::Edit
        | OperationKind::Delete
        | OperationKind::Move
        | OperationKind::Rename => {
            if !source_abs.is_file() {
                return Err(ApplyError::TargetMissing {
                    path: operation.source_path.clone(),
                });
            }
            let current = read_text(source_abs, &operation.source_path)?;
            let expected = operation.base_sha256.as_deref().unwrap_or_default();
            if sha256_hex(&current) != expected {
                return Err(ApplyError::BaseMismatch {
                    path: operation.source_path.clone(),
                    detail: "file content changed since the diff was approved".to_string(),
                });
            }
        }
    }
    Ok(())
}

fn mutate(
    repo_root: &Path,
    operation: &ChangeOperation,
    post_content: Option<&str>,
    source_abs: &Path,
    reverts: &mut Vec<Revert>,
) -> Result<Vec<StagedPath>, ApplyError> {
    match operation.kind {
        OperationKind::Create => {
            let post = post_content.unwrap_or_default();
            write_atomic(source_abs, post, &operation.source_path)?;
            reverts.push(Revert::RemoveCreated(source_abs.to_path_buf()));
            verify_post(source_abs, operation, post)?;
            Ok(vec![StagedPath::Upsert(operation.source_path.clone())])
        }
        OperationKind::Edit => {
            let original = read_text(source_abs, &operation.source_path)?;
            let post = post_content.unwrap_or_default();
            write_atomic(source_abs, post, &operation.source_path)?;
            reverts.push(Revert::RestoreContent {
                path: source_abs.to_path_buf(),
                content: original,
            });
            verify_post(source_abs, operation, post)?;
            Ok(vec![StagedPath::Upsert(operation.source_path.clone())])
        }
        OperationKind::Delete => {
            let original = read_text(source_abs, &operation.source_path)?;
            fs::remove_file(source_abs).map_err(io_error(&operation.source_path))?;
            reverts.push(Revert::RestoreContent {
                path: source_abs.to_path_buf(),
                content: original,
            });
            Ok(vec![StagedPath::Remove(operation.source_path.clone())])
        }
        OperationKind::Move | OperationKind::Rename => {
            let destination = operation
                .destination_path
                .as_deref()
                .ok_or_else(|| ApplyError::Io {
                    path: operation.source_path.clone(),
                    message: "move without a destination path".to_string(),
                })?;
            let dest_abs = resolve(repo_root, destination).map_err(|_| ApplyError::Io {
                path: destination.to_string(),
                message: "path escapes the repository root".to_string(),
            })?;
            if dest_abs.exists() {
                return Err(ApplyError::TargetExists {
                    path: destination.to_string(),
                });
            }
            if let Some(parent) = dest_abs.parent() {
                fs::create_dir_all(parent).map_err(io_error(destination))?;
            }
            fs::rename(source_abs, &dest_abs).map_err(io_error(&operation.source_path))?;
            reverts.push(Revert::MoveBack {
                from: dest_abs,
                to: source_abs.to_path_buf(),
            });
            Ok(vec![
                StagedPath::Remove(operation.source_path.clone()),
                StagedPath::Upsert(destination.to_string()),
            ])
        }
    }
}

/// Temp file in the target's directory, flushed and fsynced, then renamed
/// into place so readers never observe a half-written file.
fn write_atomic(target: &Path, content: &str, relative: &str) -> Result<(), ApplyError> {
    let parent = target.parent().ok_or_else(|| ApplyError::Io {
        path: relative.to_string(),
        message: "target has no parent directory".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(io_error(relative))?;
    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("target");
    let tmp = parent.join(format!(".{file_name}.tmp"));
    let mut handle = fs::File::create(&tmp).map_err(io_error(relative))?;
    handle
        .write_all(content.as_bytes())
        .and_then(|()| handle.sync_all())
        .map_err(io_error(relative))?;
    fs::rename(&tmp, target).map_err(io_error(relative))
}

fn verify_post(
    target: &Path,
    operation: &ChangeOperation,
    expected_content: &str,
) -> Result<(), ApplyError> {
    let written = read_text(target, &operation.source_path)?;
    let expected = operation
        .post_sha256
        .clone()
        .unwrap_or_else(|| sha256_hex(expected_content));
    if sha256_hex(&written) != expected {
        return Err(ApplyError::PostImageMismatch {
            path: operation.source_path.clone(),
        });
    }
    Ok(())
}

fn read_text(path: &Path, relative: &str) -> Result<String, ApplyError> {
    let bytes = fs::read(path).map_err(io_error(relative))?;
    String::from_utf8(bytes).map_err(|_| ApplyError::Io {
        path: relative.to_string(),
        message: "content is not valid UTF-8".to_string(),
    })
}

fn io_error(relative: &str) -> impl FnOnce(std::io::Error) -> ApplyError + '_ {
    move |err| ApplyError::Io {
        path: relative.to_string(),
        message: err.to_string(),
    }
}

/// Reverts run in reverse mutation order.
fn run_reverts(reverts: Vec<Revert>) {
    for revert in reverts.into_iter().rev() {
        revert.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::enums::Language;
    use sw_vcs::GitBackend;
    use tempfile::TempDir;

    fn operation(kind: OperationKind, source: &str) -> ChangeOperation {
        ChangeOperation {
            kind,
            source_path: source.to_string(),
            destination_path: None,
            language: Language::Unknown,
            hunks: Vec::new(),
            base_sha256: None,
            post_sha256: None,
        }
    }

    #[test]
    fn creates_writes_and_commits() {
        let repo = TempDir::new().unwrap();
        let mut op = operation(OperationKind::Create, "notes.txt");
        op.post_sha256 = Some(sha256_hex("hello\n"));
        let result =
            apply_change::<GitBackend>(repo.path(), &op, Some("hello\n"), "add notes\n").unwrap();
        assert_eq!(result.paths, vec!["notes.txt".to_string()]);
        assert_eq!(fs::read_to_string(repo.path().join("notes.txt")).unwrap(), "hello\n");
        assert!(!result.commit.is_empty());
    }

    #[test]
    fn edit_rejects_stale_base() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("f.txt"), "mutated underneath\n").unwrap();
        let mut op = operation(OperationKind::Edit, "f.txt");
        op.base_sha256 = Some(sha256_hex("what was approved\n"));
        op.post_sha256 = Some(sha256_hex("new\n"));
        let err =
            apply_change::<GitBackend>(repo.path(), &op, Some("new\n"), "edit f\n").unwrap_err();
        assert!(matches!(err, ApplyError::BaseMismatch { .. }));
        // Tree untouched.
        assert_eq!(
            fs::read_to_string(repo.path().join("f.txt")).unwrap(),
            "mutated underneath\n"
        );
    }

    #[test]
    fn rename_moves_the_file_and_stages_both_paths() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("a.py"), "print('hi')\n").unwrap();
        let mut op = operation(OperationKind::Rename, "a.py");
        op.destination_path = Some("b.py".to_string());
        op.base_sha256 = Some(sha256_hex("print('hi')\n"));
        let result = apply_change::<GitBackend>(repo.path(), &op, None, "rename a to b\n").unwrap();
        assert!(!repo.path().join("a.py").exists());
        assert_eq!(
            fs::read_to_string(repo.path().join("b.py")).unwrap(),
            "print('hi')\n"
        );
        assert_eq!(result.paths, vec!["a.py".to_string(), "b.py".to_string()]);
    }

    #[test]
    fn delete_removes_and_stages_removal() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("old.sh"), "#!/bin/sh\n").unwrap();
        let mut op = operation(OperationKind::Delete, "old.sh");
        op.base_sha256 = Some(sha256_hex("#!/bin/sh\n"));
        apply_change::<GitBackend>(repo.path(), &op, None, "drop old script\n").unwrap();
        assert!(!repo.path().join("old.sh").exists());
    }

    #[test]
    fn create_over_existing_path_is_rejected() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("notes.txt"), "already here\n").unwrap();
        let op = operation(OperationKind::Create, "notes.txt");
        let err =
            apply_change::<GitBackend>(repo.path(), &op, Some("x\n"), "add notes\n").unwrap_err();
        assert!(matches!(err, ApplyError::TargetExists { .. }));
    }
}
