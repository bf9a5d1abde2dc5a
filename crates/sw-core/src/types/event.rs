use crate::types::change::PreprocessedChange;
use crate::types::enums::{PipelineState, ReviewDecision, ReviewStage};
use crate::types::ids::ReviewId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventBody {
    RequestReceived {
        summary: String,
        target_path: String,
    },
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    ReviewOpened {
        review_id: ReviewId,
        stage: ReviewStage,
    },
    ReviewDecided {
        review_id: ReviewId,
        stage: ReviewStage,
        decision: ReviewDecision,
    },
    ChangePreprocessed {
        change: PreprocessedChange,
    },
    Applied {
        commit: Option<String>,
    },
    Terminated {
        state: PipelineState,
    },
}
