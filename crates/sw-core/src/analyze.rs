//! Turns a parsed single-file diff into a concrete [`ChangeOperation`]:
//! classifies the operation, enforces the path policy, detects the
//! language, and reconstructs the pre- and post-images against the
//! working tree.

use crate::diff::apply_hunks;
use crate::error::AnalysisError;
use crate::types::diff::{FileDiff, LineKind};
use crate::types::enums::{Language, OperationKind};
use crate::types::ChangeOperation;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Everything the analyzer derives from one file diff. The images are kept
/// alongside the operation so apply never has to re-read or re-derive them.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub operation: ChangeOperation,
    /// Pre-image content; `None` for Create.
    pub base_content: Option<String>,
    /// Post-image content; `None` for Delete/Move/Rename.
    pub post_content: Option<String>,
}

pub fn analyze(repo_root: &Path, file: &FileDiff) -> Result<Analysis, AnalysisError> {
    let kind = classify(file);

    match kind {
        OperationKind::Create => {
            let target = file.new_path.as_deref().unwrap_or_default();
            let abs = resolve(repo_root, target)?;
            if abs.exists() {
                return Err(AnalysisError::PathExists {
                    path: target.to_string(),
                });
            }
            let post = apply_hunks("", file, target)?;
            Ok(Analysis {
                operation: ChangeOperation {
                    kind,
                    source_path: target.to_string(),
                    destination_path: None,
                    language: detect_language(target, Some(&post)),
                    hunks: file.hunks.clone(),
                    base_sha256: None,
                    post_sha256: Some(sha256_hex(&post)),
                },
                base_content: None,
                post_content: Some(post),
            })
        }
        OperationKind::Delete => {
            let source = file.old_path.as_deref().unwrap_or_default();
            let base = read_base(repo_root, source)?;
            // The diff must describe the full current content of the file.
            let post = apply_hunks(&base, file, source)?;
            if !post.is_empty() {
                return Err(AnalysisError::HunkMismatch {
                    path: source.to_string(),
                    line: 1,
                    detail: "deletion diff does not remove the entire file".to_string(),
                });
            }
            Ok(Analysis {
                operation: ChangeOperation {
                    kind,
                    source_path: source.to_string(),
                    destination_path: None,
                    language: detect_language(source, Some(&base)),
                    hunks: file.hunks.clone(),
                    base_sha256: Some(sha256_hex(&base)),
                    post_sha256: None,
                },
                base_content: Some(base),
                post_content: None,
            })
        }
        OperationKind::Move | OperationKind::Rename => {
            let source = file.old_path.as_deref().unwrap_or_default();
            let destination = file.new_path.as_deref().unwrap_or_default();
            if edits_content(file) {
                return Err(AnalysisError::RenameWithEdits {
                    from_path: source.to_string(),
                    destination: destination.to_string(),
                });
            }
            let base = read_base(repo_root, source)?;
            let dest_abs = resolve(repo_root, destination)?;
            if dest_abs.exists() {
                return Err(AnalysisError::PathExists {
                    path: destination.to_string(),
                });
            }
            let digest = sha256_hex(&base);
            Ok(Analysis {
                operation: ChangeOperation {
                    kind,
                    source_path: source.to_string(),
                    destination_path: Some(destination.to_string()),
                    language: detect_language(destination, Some(&base)),
                    hunks: Vec::new(),
                    base_sha256: Some(digest.clone()),
                    post_sha256: Some(digest),
                },
                base_content: Some(base),
                post_content: None,
            })
        }
        OperationKind::Edit => {
            let source = file.old_path.as_deref().unwrap_or_default();
            let base = read_base(repo_root, source)?;
            let post = apply_hunks(&base, file, source)?;
            Ok(Analysis {
                operation: ChangeOperation {
                    kind,
                    source_path: source.to_string(),
                    destination_path: None,
                    language: detect_language(source, Some(&base)),
                    hunks: file.hunks.clone(),
                    base_sha256: Some(sha256_hex(&base)),
                    post_sha256: Some(sha256_hex(&post)),
                },
                base_content: Some(base),
                post_content: Some(post),
            })
        }
    }
}

fn classify(file: &FileDiff) -> OperationKind {
    match (file.old_path.as_deref(), file.new_path.as_deref()) {
        (None, Some(_)) => OperationKind::Create,
        (Some(_), None) => OperationKind::Delete,
        (Some(old), Some(new)) if file.is_rename || old != new => {
            if Path::new(old).parent() == Path::new(new).parent() {
                OperationKind::Rename
            } else {
                OperationKind::Move
            }
        }
        _ => OperationKind::Edit,
    }
}

/// A rename/move header accompanied by added or removed lines means the agent
/// collapsed two operations into one request.
fn edits_content(file: &FileDiff) -> bool {
    file.hunks
        .iter()
        .flat_map(|hunk| hunk.lines.iter())
        .any(|line| line.kind != LineKind::Context)
}

/// Resolves `relative` under `repo_root`, rejecting absolute paths and any
/// `..` traversal.
pub fn resolve(repo_root: &Path, relative: &str) -> Result<PathBuf, AnalysisError> {
    let path = Path::new(relative);
    if relative.is_empty() || path.is_absolute() {
        return Err(AnalysisError::PathOutsideRepo {
            path: relative.to_string(),
        });
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(AnalysisError::PathOutsideRepo {
                    path: relative.to_string(),
                });
            }
        }
    }
    Ok(repo_root.join(path))
}

fn read_base(repo_root: &Path, relative: &str) -> Result<String, AnalysisError> {
    let abs = resolve(repo_root, relative)?;
    if !abs.exists() {
        return Err(AnalysisError::SourceMissing {
            path: relative.to_string(),
        });
    }
    if !abs.is_file() {
        return Err(AnalysisError::NotAFile {
            path: relative.to_string(),
        });
    }
    let bytes = std::fs::read(&abs).map_err(|err| AnalysisError::SourceMissing {
        path: format!("{relative}: {err}"),
    })?;
    String::from_utf8(bytes).map_err(|_| AnalysisError::BinaryContent {
        path: relative.to_string(),
    })
}

pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extension-based detection with a shebang fallback for extensionless
/// scripts. Unmapped extensions (including prose formats) are `Unknown` and
/// skip normalization entirely.
pub fn detect_language(path: &str, content: Option<&str>) -> Language {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("rs") => Language::Rust,
        Some("py") => Language::Python,
        Some("js" | "mjs" | "cjs") => Language::JavaScript,
        Some("ts" | "mts" | "cts") => Language::TypeScript,
        Some("go") => Language::Go,
        Some("sh" | "bash") => Language::Shell,
        Some("json") => Language::Json,
        Some("toml") => Language::Toml,
        _ => content.map_or(Language::Unknown, sniff_shebang),
    }
}

fn sniff_shebang(content: &str) -> Language {
    let Some(first) = content.lines().next() else {
        return Language::Unknown;
    };
    let Some(interpreter) = first.strip_prefix("#!") else {
        return Language::Unknown;
    };
    if interpreter.contains("python") {
        Language::Python
    } else if interpreter.contains("node") {
        Language::JavaScript
    } else if interpreter.contains("sh") {
        Language::Shell
    } else {
        Language::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse;
    use std::fs;
    use tempfile::TempDir;

    fn repo_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let abs = dir.path().join(path);
            if let Some(parent) = abs.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(abs, content).unwrap();
        }
        dir
    }

    #[test]
    fn classifies_creation() {
        let repo = repo_with(&[]);
        let diff = "--- /dev/null\n+++ b/README.md\n@@ -0,0 +1 @@\n+# Project\n";
        let files = parse(diff).unwrap();
        let analysis = analyze(repo.path(), &files[0]).unwrap();
        assert_eq!(analysis.operation.kind, OperationKind::Create);
        assert_eq!(analysis.operation.language, Language::Unknown);
        assert_eq!(analysis.post_content.as_deref(), Some("# Project\n"));
        assert!(analysis.operation.base_sha256.is_none());
    }

    #[test]
    fn rejects_creation_over_existing_file() {
        let repo = repo_with(&[("README.md", "existing\n")]);
        let diff = "--- /dev/null\n+++ b/README.md\n@@ -0,0 +1 @@\n+# Project\n";
        let files = parse(diff).unwrap();
        let err = analyze(repo.path(), &files[0]).unwrap_err();
        assert!(matches!(err, AnalysisError::PathExists { .. }));
    }

    #[test]
    fn classifies_edit_and_reconstructs_post_image() {
        let repo = repo_with(&[("src/main.rs", "fn main() {\n    old();\n}\n")]);
        let diff = "--- a/src/main.rs\n+++ b/src/main.rs\n@@ -1,3 +1,3 @@\n fn main() {\n-    old();\n+    new();\n }\n";
        let files = parse(diff).unwrap();
        let analysis = analyze(repo.path(), &files[0]).unwrap();
        assert_eq!(analysis.operation.kind, OperationKind::Edit);
        assert_eq!(analysis.operation.language, Language::Rust);
        assert_eq!(
            analysis.post_content.as_deref(),
            Some("fn main() {\n    new();\n}\n")
        );
    }

    #[test]
    fn classifies_rename_in_same_directory() {
        let repo = repo_with(&[("a.py", "print('hi')\n")]);
        let diff =
            "diff --git a/a.py b/b.py\nsimilarity index 100%\nrename from a.py\nrename to b.py\n";
        let files = parse(diff).unwrap();
        let analysis = analyze(repo.path(), &files[0]).unwrap();
        assert_eq!(analysis.operation.kind, OperationKind::Rename);
        assert_eq!(analysis.operation.destination_path.as_deref(), Some("b.py"));
        assert_eq!(
            analysis.operation.base_sha256,
            analysis.operation.post_sha256
        );
    }

    #[test]
    fn classifies_move_across_directories() {
        let repo = repo_with(&[("a.py", "print('hi')\n")]);
        let diff = "diff --git a/a.py b/lib/a.py\nsimilarity index 100%\nrename from a.py\nrename to lib/a.py\n";
        let files = parse(diff).unwrap();
        let analysis = analyze(repo.path(), &files[0]).unwrap();
        assert_eq!(analysis.operation.kind, OperationKind::Move);
    }

    #[test]
    fn rejects_rename_that_also_edits() {
        let repo = repo_with(&[("a.py", "print('hi')\n")]);
        let diff = "diff --git a/a.py b/b.py\nrename from a.py\nrename to b.py\n--- a/a.py\n+++ b/b.py\n@@ -1 +1 @@\n-print('hi')\n+print('bye')\n";
        let files = parse(diff).unwrap();
        let err = analyze(repo.path(), &files[0]).unwrap_err();
        assert!(matches!(err, AnalysisError::RenameWithEdits { .. }));
        assert_eq!(
            err.to_string(),
            "rename from a.py to b.py also edits content; submit as two requests"
        );
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn rejects_path_traversal() {
        let repo = repo_with(&[]);
        let diff = "--- /dev/null\n+++ b/../escape.txt\n@@ -0,0 +1 @@\n+bad\n";
        let files = parse(diff).unwrap();
        let err = analyze(repo.path(), &files[0]).unwrap_err();
        assert!(matches!(err, AnalysisError::PathOutsideRepo { .. }));
    }

    #[test]
    fn rejects_stale_base() {
        let repo = repo_with(&[("f.txt", "changed underneath\n")]);
        let diff = "--- a/f.txt\n+++ b/f.txt\n@@ -1 +1 @@\n-original\n+updated\n";
        let files = parse(diff).unwrap();
        let err = analyze(repo.path(), &files[0]).unwrap_err();
        assert!(matches!(err, AnalysisError::HunkMismatch { .. }));
    }

    #[test]
    fn rejects_binary_source() {
        let repo = repo_with(&[]);
        fs::write(repo.path().join("blob.rs"), [0xff, 0xfe, 0x00, 0x01]).unwrap();
        let diff = "--- a/blob.rs\n+++ b/blob.rs\n@@ -1 +1 @@\n-x\n+y\n";
        let files = parse(diff).unwrap();
        let err = analyze(repo.path(), &files[0]).unwrap_err();
        assert!(matches!(err, AnalysisError::BinaryContent { .. }));
    }

    #[test]
    fn detects_shebang_language() {
        assert_eq!(
            detect_language("bin/tool", Some("#!/usr/bin/env python3\n")),
            Language::Python
        );
        assert_eq!(detect_language("bin/tool", Some("plain text\n")), Language::Unknown);
        assert_eq!(detect_language("notes.md", Some("# heading\n")), Language::Unknown);
    }
}
