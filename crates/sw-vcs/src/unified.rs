//! Unified-diff rendering from old/new text pairs.
//!
//! Used by the normalizer to re-render a canonical diff after formatting, so
//! the reviewed diff is minimal regardless of how the agent produced its hunks.

use crate::backend::VcsError;
use gix::diff::blob::intern::InternedInput;
use gix::diff::blob::sink::Counter;
use gix::diff::blob::sources::lines;
use gix::diff::blob::{Algorithm, UnifiedDiffBuilder};
use std::fmt::Write as _;

/// Renders a single-file unified diff with git-style headers. `None` on either
/// side stands for a nonexistent file (`/dev/null` header).
pub fn render_file_diff(
    old_path: &str,
    new_path: &str,
    old_text: Option<&str>,
    new_text: Option<&str>,
) -> Result<String, VcsError> {
    let mut output = String::new();
    writeln!(output, "diff --git a/{old_path} b/{new_path}")
        .map_err(map_diff_error("write diff"))?;
    let left_header = if old_text.is_some() {
        format!("a/{old_path}")
    } else {
        "/dev/null".to_string()
    };
    let right_header = if new_text.is_some() {
        format!("b/{new_path}")
    } else {
        "/dev/null".to_string()
    };
    writeln!(output, "--- {left_header}").map_err(map_diff_error("write diff"))?;
    writeln!(output, "+++ {right_header}").map_err(map_diff_error("write diff"))?;

    let diff = diff_text(old_text, new_text);
    if !diff.wrapped.is_empty() {
        output.push_str(diff.wrapped.as_str());
        if !output.ends_with('\n') {
            output.push('\n');
        }
    }
    Ok(output)
}

// The builder terminates every emitted line itself, so the token source must
// not carry terminators or each hunk line is followed by a spurious blank one.
fn diff_text(old_text: Option<&str>, new_text: Option<&str>) -> Counter<String> {
    let input = InternedInput::new(
        lines(old_text.unwrap_or_default()),
        lines(new_text.unwrap_or_default()),
    );
    gix::diff::blob::diff(
        Algorithm::Histogram,
        &input,
        Counter::new(UnifiedDiffBuilder::new(&input)),
    )
}

fn map_diff_error<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> VcsError {
    move |err| VcsError::DiffFailed {
        reason: format!("{context}: {err}"),
    }
}
