//! Unified diff parsing and hunk application.
//!
//! Accepts plain `---`/`+++` diffs as well as git-style diffs with `diff
//! --git` preambles, mode lines and rename headers. The parser is strict
//! about hunk line counts so a malformed diff is rejected before it ever
//! reaches a human.

use crate::error::{AnalysisError, ValidationError};
use crate::types::diff::{FileDiff, Hunk, HunkLine, LineKind};

pub fn parse(unified_diff: &str) -> Result<Vec<FileDiff>, ValidationError> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;
    // Remaining old/new line budget of the hunk being filled.
    let mut remaining = (0usize, 0usize);
    let mut last_kind: Option<LineKind> = None;

    for (index, line) in unified_diff.lines().enumerate() {
        let line_no = index + 1;
        let in_hunk = remaining.0 > 0 || remaining.1 > 0;

        // The marker follows the line it qualifies, so it can land inside a
        // hunk or right after the hunk's declared budget is spent.
        if line == "\\ No newline at end of file" {
            let file = current.as_mut().ok_or(ValidationError::DiffUnparsable {
                line: line_no,
                message: "newline marker before any file header".to_string(),
            })?;
            match last_kind {
                Some(LineKind::Removed) => file.base_missing_newline = true,
                Some(LineKind::Added) => file.post_missing_newline = true,
                Some(LineKind::Context) => {
                    file.base_missing_newline = true;
                    file.post_missing_newline = true;
                }
                None => {
                    return Err(ValidationError::DiffUnparsable {
                        line: line_no,
                        message: "newline marker before any hunk line".to_string(),
                    });
                }
            }
            continue;
        }

        if in_hunk {
            let file = current.as_mut().ok_or(ValidationError::DiffUnparsable {
                line: line_no,
                message: "hunk content before any file header".to_string(),
            })?;
            let hunk = file.hunks.last_mut().ok_or(ValidationError::DiffUnparsable {
                line: line_no,
                message: "hunk content before any hunk header".to_string(),
            })?;
            let (kind, text) = match line.chars().next() {
                Some('+') => (LineKind::Added, &line[1..]),
                Some('-') => (LineKind::Removed, &line[1..]),
                Some(' ') => (LineKind::Context, &line[1..]),
                // Some producers emit genuinely empty context lines.
                None => (LineKind::Context, ""),
                Some(_) => {
                    return Err(ValidationError::DiffUnparsable {
                        line: line_no,
                        message: format!("unexpected line inside hunk: {line:?}"),
                    });
                }
            };
            match kind {
                LineKind::Added => {
                    if remaining.1 == 0 {
                        return Err(ValidationError::DiffUnparsable {
                            line: line_no,
                            message: "more added lines than the hunk header declares".to_string(),
                        });
                    }
                    remaining.1 -= 1;
                }
                LineKind::Removed => {
                    if remaining.0 == 0 {
                        return Err(ValidationError::DiffUnparsable {
                            line: line_no,
                            message: "more removed lines than the hunk header declares".to_string(),
                        });
                    }
                    remaining.0 -= 1;
                }
                LineKind::Context => {
                    if remaining.0 == 0 || remaining.1 == 0 {
                        return Err(ValidationError::DiffUnparsable {
                            line: line_no,
                            message: "more context lines than the hunk header declares".to_string(),
                        });
                    }
                    remaining.0 -= 1;
                    remaining.1 -= 1;
                }
            }
            hunk.lines.push(HunkLine {
                kind,
                text: text.to_string(),
            });
            last_kind = Some(kind);
            continue;
        }

        if line.starts_with("diff --git ") {
            if let Some(file) = current.take() {
                files.push(file);
            }
            current = Some(empty_file());
            last_kind = None;
            let mut parts = line.split_whitespace().skip(2);
            if let (Some(old), Some(new)) = (parts.next(), parts.next()) {
                let file = current.as_mut().ok_or(ValidationError::DiffUnparsable {
                    line: line_no,
                    message: "missing file state".to_string(),
                })?;
                file.old_path = strip_prefix(old);
                file.new_path = strip_prefix(new);
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("--- ") {
            if current.is_none() || current.as_ref().is_some_and(|f| !f.hunks.is_empty()) {
                if let Some(file) = current.take() {
                    files.push(file);
                }
                current = Some(empty_file());
                last_kind = None;
            }
            if let Some(file) = current.as_mut() {
                file.old_path = parse_marker(rest);
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("+++ ") {
            if let Some(file) = current.as_mut() {
                file.new_path = parse_marker(rest);
            } else {
                return Err(ValidationError::DiffUnparsable {
                    line: line_no,
                    message: "'+++' header without a preceding '---'".to_string(),
                });
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("rename from ") {
            let file = current.get_or_insert_with(empty_file);
            file.old_path = Some(rest.to_string());
            file.is_rename = true;
            continue;
        }
        if let Some(rest) = line.strip_prefix("rename to ") {
            let file = current.get_or_insert_with(empty_file);
            file.new_path = Some(rest.to_string());
            file.is_rename = true;
            continue;
        }
        if line.starts_with("@@ ") || line.starts_with("@@-") {
            let file = current.as_mut().ok_or(ValidationError::DiffUnparsable {
                line: line_no,
                message: "hunk header before any file header".to_string(),
            })?;
            let hunk = parse_hunk_header(line).ok_or(ValidationError::DiffUnparsable {
                line: line_no,
                message: format!("malformed hunk header: {line:?}"),
            })?;
            remaining = (hunk.old_len, hunk.new_len);
            last_kind = None;
            file.hunks.push(hunk);
            continue;
        }
        if line.starts_with("index ")
            || line.starts_with("new file mode")
            || line.starts_with("deleted file mode")
            || line.starts_with("old mode")
            || line.starts_with("new mode")
            || line.starts_with("similarity index")
            || line.starts_with("dissimilarity index")
            || line.is_empty()
        {
            continue;
        }
        return Err(ValidationError::DiffUnparsable {
            line: line_no,
            message: format!("unrecognized line outside hunks: {line:?}"),
        });
    }

    if remaining.0 > 0 || remaining.1 > 0 {
        return Err(ValidationError::DiffUnparsable {
            line: unified_diff.lines().count(),
            message: "diff ends in the middle of a hunk".to_string(),
        });
    }
    if let Some(file) = current.take() {
        files.push(file);
    }
    if files.is_empty() {
        return Err(ValidationError::NoPaths);
    }
    for file in &files {
        if file.target_path().is_none() {
            return Err(ValidationError::NoPaths);
        }
    }
    Ok(files)
}

fn empty_file() -> FileDiff {
    FileDiff {
        old_path: None,
        new_path: None,
        is_rename: false,
        hunks: Vec::new(),
        post_missing_newline: false,
        base_missing_newline: false,
    }
}

/// `a/path`, `b/path` or `/dev/null` on a `---`/`+++` line; timestamps after
/// a tab are discarded.
fn parse_marker(rest: &str) -> Option<String> {
    let path = rest.split('\t').next().unwrap_or(rest).trim();
    if path == "/dev/null" {
        return None;
    }
    strip_prefix(path)
}

fn strip_prefix(path: &str) -> Option<String> {
    if path == "/dev/null" {
        return None;
    }
    let stripped = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// `@@ -old_start[,old_len] +new_start[,new_len] @@`
fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let body = line.strip_prefix("@@")?;
    let end = body.find("@@")?;
    let ranges = body[..end].trim();
    let mut parts = ranges.split_whitespace();
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;
    let (old_start, old_len) = parse_range(old)?;
    let (new_start, new_len) = parse_range(new)?;
    Some(Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        lines: Vec::new(),
    })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Applies the file's hunks to `base`, verifying context and removed lines
/// against the base content. `path` is for error reporting only.
pub fn apply_hunks(base: &str, file: &FileDiff, path: &str) -> Result<String, AnalysisError> {
    let mut base_lines: Vec<&str> = base.split('\n').collect();
    if base_lines.last() == Some(&"") && base.ends_with('\n') {
        base_lines.pop();
    }
    if base.is_empty() {
        base_lines.clear();
    }

    // Line-by-line matching cannot see terminators, so the no-newline claim
    // on the pre-image is checked against the file itself.
    if file.base_missing_newline && base.ends_with('\n') {
        return Err(AnalysisError::HunkMismatch {
            path: path.to_string(),
            line: base_lines.len(),
            detail: "diff expects the final line to end without a newline".to_string(),
        });
    }

    let mut output: Vec<&str> = Vec::new();
    let mut src = 0usize;
    for hunk in &file.hunks {
        let start = hunk.old_start.saturating_sub(1);
        if start > base_lines.len() {
            return Err(AnalysisError::HunkMismatch {
                path: path.to_string(),
                line: hunk.old_start,
                detail: "hunk starts beyond the end of the file".to_string(),
            });
        }
        while src < start {
            output.push(base_lines[src]);
            src += 1;
        }
        for line in &hunk.lines {
            match line.kind {
                LineKind::Context | LineKind::Removed => {
                    let Some(actual) = base_lines.get(src) else {
                        return Err(AnalysisError::HunkMismatch {
                            path: path.to_string(),
                            line: src + 1,
                            detail: "diff expects content past the end of the file".to_string(),
                        });
                    };
                    if *actual != line.text {
                        return Err(AnalysisError::HunkMismatch {
                            path: path.to_string(),
                            line: src + 1,
                            detail: format!("expected {:?}, found {actual:?}", line.text),
                        });
                    }
                    if line.kind == LineKind::Context {
                        output.push(actual);
                    }
                    src += 1;
                }
                LineKind::Added => output.push(&line.text),
            }
        }
    }
    while src < base_lines.len() {
        output.push(base_lines[src]);
        src += 1;
    }

    if output.is_empty() {
        return Ok(String::new());
    }
    let mut result = output.join("\n");
    if !file.post_missing_newline {
        result.push('\n');
    }
    Ok(result)
}
