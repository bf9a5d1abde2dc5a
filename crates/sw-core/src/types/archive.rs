use crate::types::change::PreprocessedChange;
use crate::types::ids::ChangeId;
use crate::types::request::ChangeRequest;
use crate::types::review::ReviewRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal disposition of a change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "PascalCase")]
pub enum OutcomeDecision {
    Applied { commit: Option<String> },
    Rejected { feedback: Option<String> },
    Declined,
    Cancelled,
    Failed { reason: String },
}

/// The final record written under a change's archive directory. Write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveOutcome {
    pub change_id: ChangeId,
    #[serde(flatten)]
    pub decision: OutcomeDecision,
    pub recorded_at: DateTime<Utc>,
}

impl ArchiveOutcome {
    pub fn new(change_id: ChangeId, decision: OutcomeDecision) -> Self {
        Self {
            change_id,
            decision,
            recorded_at: Utc::now(),
        }
    }
}

/// Everything archived for one change, loaded back from disk. Entries written
/// before a use-consent decline carry only the review and outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ArchiveEntry {
    pub request: Option<ChangeRequest>,
    pub change: Option<PreprocessedChange>,
    pub reviews: Vec<ReviewRecord>,
    pub outcome: Option<ArchiveOutcome>,
}

/// Returned to callers when a request terminates without an apply: where the
/// audit trail lives and what was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub change_id: ChangeId,
    pub archived_to: PathBuf,
    pub outcome: ArchiveOutcome,
}
