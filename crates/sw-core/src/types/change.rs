use crate::types::diff::Hunk;
use crate::types::enums::{Language, OperationKind};
use crate::types::ids::ChangeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The single file/directory operation a validated diff describes. Derived by
/// the analyzer; never constructed directly by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOperation {
    pub kind: OperationKind,
    pub source_path: String,
    /// Move/Rename only.
    pub destination_path: Option<String>,
    pub language: Language,
    pub hunks: Vec<Hunk>,
    /// SHA-256 of the pre-image content; `None` for Create.
    pub base_sha256: Option<String>,
    /// SHA-256 of the post-image content; `None` for Delete.
    pub post_sha256: Option<String>,
}

impl ChangeOperation {
    /// The path the per-request mutual exclusion is keyed on.
    pub fn lock_path(&self) -> &str {
        &self.source_path
    }
}

/// Deterministic output of the pre-approval pipeline, immutable once
/// produced. Re-running preprocessing on byte-identical input yields the same
/// `change_id` and `normalized_diff`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessedChange {
    pub change_id: ChangeId,
    pub operation: ChangeOperation,
    pub raw_diff: String,
    pub normalized_diff: String,
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
}
