//! The pre-approval pipeline: validate, analyze, normalize. Deterministic by
//! construction, so resubmitting byte-identical input reproduces the same
//! change id and the same normalized diff.

use crate::analyze::{self, Analysis};
use crate::diff;
use crate::error::{StewardError, ValidationError};
use crate::normalize::NormalizerRegistry;
use crate::types::enums::OperationKind;
use crate::types::ids::ChangeId;
use crate::types::{ChangeRequest, FileDiff, PreprocessedChange};
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

/// Output of the full pre-approval pipeline. The (normalized) images ride
/// along so apply and diff-rendering never recompute them.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub change: PreprocessedChange,
    pub base_content: Option<String>,
    pub post_content: Option<String>,
}

/// Stage one: field shape, diff parse, single-path policy. Cheap and
/// tree-independent; runs before any human is interrupted.
pub fn validate(summary: &str, unified_diff: &str) -> Result<(ChangeRequest, FileDiff), ValidationError> {
    let request = ChangeRequest::validate(summary, unified_diff)?;
    let mut files = diff::parse(&request.unified_diff)?;
    if files.len() != 1 {
        return Err(ValidationError::MultiplePaths { count: files.len() });
    }
    let file = files.remove(0);
    Ok((request, file))
}

/// Stages two and three: analyze against the working tree, then normalize the
/// post-image, re-rendering the reviewed diff only if normalization changed
/// anything.
pub fn preprocess(
    repo_root: &Path,
    registry: &NormalizerRegistry,
    request: &ChangeRequest,
    file: &FileDiff,
    change_id: ChangeId,
) -> Result<PipelineOutput, StewardError> {
    let Analysis {
        mut operation,
        base_content,
        post_content,
    } = analyze::analyze(repo_root, file)?;

    let mut formatted = false;
    let mut linted = false;
    let post_content = match post_content {
        Some(post) => {
            linted = registry.get(operation.language).is_some();
            let normalized = registry.apply(operation.language, &post)?;
            formatted = normalized != post;
            operation.post_sha256 = Some(analyze::sha256_hex(&normalized));
            Some(normalized)
        }
        None => None,
    };

    // The agent's diff is the reviewed artifact unless normalization actually
    // rewrote the post-image; only then is a fresh diff rendered from the
    // images so the reviewer sees the formatted content.
    let normalized_diff = if formatted {
        render_normalized_diff(
            &operation,
            base_content.as_deref(),
            post_content.as_deref(),
        )?
    } else {
        request.unified_diff.clone()
    };

    let mut metadata = BTreeMap::new();
    metadata.insert("operation".to_string(), json!(operation.kind.to_string()));
    metadata.insert("language".to_string(), json!(operation.language.to_string()));
    metadata.insert("source_path".to_string(), json!(operation.source_path));
    if let Some(destination) = &operation.destination_path {
        metadata.insert("destination_path".to_string(), json!(destination));
    }
    metadata.insert("additions".to_string(), json!(file.additions()));
    metadata.insert("removals".to_string(), json!(file.removals()));
    metadata.insert("formatted".to_string(), json!(formatted));
    metadata.insert(
        "lint".to_string(),
        json!(if linted { "passed" } else { "skipped" }),
    );
    if let Some(digest) = &operation.base_sha256 {
        metadata.insert("base_sha256".to_string(), json!(digest));
    }
    if let Some(digest) = &operation.post_sha256 {
        metadata.insert("post_sha256".to_string(), json!(digest));
    }

    Ok(PipelineOutput {
        change: PreprocessedChange {
            change_id,
            operation,
            raw_diff: request.unified_diff.clone(),
            normalized_diff,
            metadata,
            created_at: Utc::now(),
        },
        base_content,
        post_content,
    })
}

/// Reviewed diff re-rendered from the normalized images. Only reachable when
/// a formatter rewrote the post-image, which means the operation carries a
/// content delta (Create or Edit).
fn render_normalized_diff(
    operation: &crate::types::ChangeOperation,
    base: Option<&str>,
    post: Option<&str>,
) -> Result<String, StewardError> {
    let old = match operation.kind {
        OperationKind::Create => None,
        _ => base,
    };
    Ok(sw_vcs::unified::render_file_diff(
        &operation.source_path,
        &operation.source_path,
        old,
        post,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::enums::Language;
    use std::fs;
    use tempfile::TempDir;

    const SUMMARY: &str = "normalize the helper script";

    fn run(repo: &TempDir, summary: &str, diff: &str) -> Result<PipelineOutput, StewardError> {
        let (request, file) = validate(summary, diff)?;
        let change_id = ChangeId::derive(summary, diff);
        preprocess(
            repo.path(),
            &NormalizerRegistry::with_defaults(),
            &request,
            &file,
            change_id,
        )
    }

    #[test]
    fn rejects_multi_path_diffs() {
        let diff = "--- a/one.txt\n+++ b/one.txt\n@@ -1 +1 @@\n-a\n+b\n--- a/two.txt\n+++ b/two.txt\n@@ -1 +1 @@\n-c\n+d\n";
        assert!(matches!(
            validate("touch two files at once", diff),
            Err(ValidationError::MultiplePaths { count: 2 })
        ));
    }

    #[test]
    fn preprocessing_is_deterministic() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("tool.py"), "print('x')  \n").unwrap();
        let diff = "--- a/tool.py\n+++ b/tool.py\n@@ -1 +1 @@\n-print('x')  \n+print('y')  \n";
        let first = run(&repo, SUMMARY, diff).unwrap();
        let second = run(&repo, SUMMARY, diff).unwrap();
        assert_eq!(first.change.change_id, second.change.change_id);
        assert_eq!(first.change.normalized_diff, second.change.normalized_diff);
        assert_eq!(first.change.metadata, second.change.metadata);
    }

    #[test]
    fn normalization_shows_up_in_the_reviewed_diff() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("tool.py"), "print('x')\n").unwrap();
        let diff = "--- a/tool.py\n+++ b/tool.py\n@@ -1 +1 @@\n-print('x')\n+print('y')   \n";
        let output = run(&repo, SUMMARY, diff).unwrap();
        assert_eq!(output.post_content.as_deref(), Some("print('y')\n"));
        assert!(output.change.normalized_diff.contains("+print('y')\n"));
        assert!(!output.change.normalized_diff.contains("print('y')   "));
        // Normalization changed the post-image, so the recorded digest follows.
        assert_eq!(
            output.change.operation.post_sha256.as_deref(),
            Some(crate::analyze::sha256_hex("print('y')\n").as_str())
        );
        assert_eq!(output.change.metadata.get("formatted"), Some(&json!(true)));
        assert_eq!(output.change.metadata.get("lint"), Some(&json!("passed")));
        // The re-rendered diff must itself survive a parse round trip.
        let reparsed = crate::diff::parse(&output.change.normalized_diff).unwrap();
        assert_eq!(reparsed.len(), 1);
        assert_eq!(reparsed[0].new_path.as_deref(), Some("tool.py"));
    }

    #[test]
    fn unknown_language_passes_through_unchanged() {
        let repo = TempDir::new().unwrap();
        let diff = "--- /dev/null\n+++ b/README.md\n@@ -0,0 +1,2 @@\n+# Project\n+trailing   \n";
        let output = run(&repo, "add a project readme", diff).unwrap();
        assert_eq!(output.change.operation.language, Language::Unknown);
        assert_eq!(
            output.post_content.as_deref(),
            Some("# Project\ntrailing   \n")
        );
        assert_eq!(output.change.metadata.get("lint"), Some(&json!("skipped")));
        // No formatter is registered for markdown, so the reviewed diff is the
        // submitted diff byte for byte.
        assert_eq!(output.change.normalized_diff, diff);
        assert_eq!(output.change.metadata.get("formatted"), Some(&json!(false)));
    }

    #[test]
    fn rename_diff_passes_through_verbatim() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("a.py"), "print('hi')\n").unwrap();
        let diff =
            "diff --git a/a.py b/b.py\nsimilarity index 100%\nrename from a.py\nrename to b.py\n";
        let output = run(&repo, "rename a.py to b.py for clarity", diff).unwrap();
        assert_eq!(
            output.change.normalized_diff,
            "diff --git a/a.py b/b.py\nsimilarity index 100%\nrename from a.py\nrename to b.py\n"
        );
    }

    #[test]
    fn lint_failure_carries_every_violation() {
        let repo = TempDir::new().unwrap();
        let diff = "--- /dev/null\n+++ b/conf.json\n@@ -0,0 +1 @@\n+{not json\n";
        let err = run(&repo, "add a config file", diff).unwrap_err();
        assert_eq!(err.code(), "lint_failed");
    }
}
