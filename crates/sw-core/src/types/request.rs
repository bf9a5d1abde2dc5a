use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

pub const SUMMARY_MIN_LEN: usize = 10;
pub const SUMMARY_MAX_LEN: usize = 2000;

/// The immutable two-field input contract an agent submits: a natural-language
/// summary plus a unified diff. Constructed only through [`ChangeRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub summary: String,
    pub unified_diff: String,
}

impl ChangeRequest {
    /// Field-shape validation: summary length bounds and a cheap check that
    /// the diff at least opens like a unified diff. Structural parsing happens
    /// in the validation stage of the pipeline.
    pub fn validate(summary: &str, unified_diff: &str) -> Result<Self, ValidationError> {
        let trimmed = summary.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::SummaryBlank);
        }
        if trimmed.chars().count() < SUMMARY_MIN_LEN {
            return Err(ValidationError::SummaryTooShort {
                min: SUMMARY_MIN_LEN,
                len: trimmed.chars().count(),
            });
        }
        if trimmed.chars().count() > SUMMARY_MAX_LEN {
            return Err(ValidationError::SummaryTooLong {
                max: SUMMARY_MAX_LEN,
                len: trimmed.chars().count(),
            });
        }
        if unified_diff.trim().is_empty() {
            return Err(ValidationError::DiffEmpty);
        }
        let head = unified_diff.trim_start();
        if !(head.starts_with("diff --git") || head.starts_with("--- ")) {
            return Err(ValidationError::DiffUnparsable {
                line: 1,
                message: "input does not open with a 'diff --git' or '---' header".to_string(),
            });
        }
        Ok(Self {
            summary: summary.to_string(),
            unified_diff: unified_diff.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFF: &str = "--- /dev/null\n+++ b/f.txt\n@@ -0,0 +1 @@\n+x\n";

    #[test]
    fn accepts_well_formed_request() {
        let req = ChangeRequest::validate("add an f file", DIFF).unwrap();
        assert_eq!(req.summary, "add an f file");
    }

    #[test]
    fn rejects_blank_summary() {
        assert!(matches!(
            ChangeRequest::validate("   ", DIFF),
            Err(ValidationError::SummaryBlank)
        ));
    }

    #[test]
    fn rejects_short_summary() {
        assert!(matches!(
            ChangeRequest::validate("too short", DIFF),
            Err(ValidationError::SummaryTooShort { min: 10, len: 9 })
        ));
    }

    #[test]
    fn rejects_empty_and_non_diff_bodies() {
        assert!(matches!(
            ChangeRequest::validate("a fine summary", ""),
            Err(ValidationError::DiffEmpty)
        ));
        assert!(matches!(
            ChangeRequest::validate("a fine summary", "not a diff at all"),
            Err(ValidationError::DiffUnparsable { .. })
        ));
    }
}
