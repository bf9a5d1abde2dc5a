use crate::types::enums::{ReviewDecision, ReviewStage};
use crate::types::ids::{ChangeId, ReviewId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One human checkpoint round. Created Pending when the checkpoint is
/// reached, mutated exactly once when the decision lands, then frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub review_id: ReviewId,
    pub change_id: ChangeId,
    pub stage: ReviewStage,
    pub decision: ReviewDecision,
    pub feedback: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ReviewRecord {
    pub fn open(change_id: ChangeId, stage: ReviewStage) -> Self {
        Self {
            review_id: ReviewId::generate(),
            change_id,
            stage,
            decision: ReviewDecision::Pending,
            feedback: None,
            opened_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn is_decided(&self) -> bool {
        self.decision != ReviewDecision::Pending
    }
}

/// What the human reviewer is shown at a checkpoint. `normalized_diff` and
/// `metadata` are empty at the use-consent stage (nothing has been
/// preprocessed yet) and populated at apply-approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPayload {
    pub review_id: ReviewId,
    pub change_id: ChangeId,
    pub stage: ReviewStage,
    pub message: String,
    pub summary: String,
    pub normalized_diff: String,
    pub metadata: BTreeMap<String, Value>,
}
