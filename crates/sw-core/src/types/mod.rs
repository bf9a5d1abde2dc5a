pub mod archive;
pub mod change;
pub mod diff;
pub mod enums;
pub mod event;
pub mod ids;
pub mod request;
pub mod review;

pub use archive::{ArchiveEntry, ArchiveOutcome, ArchiveRecord, OutcomeDecision};
pub use change::{ChangeOperation, PreprocessedChange};
pub use diff::{FileDiff, Hunk, HunkLine, LineKind};
pub use enums::{Language, OperationKind, PipelineState, ReviewDecision, ReviewStage};
pub use event::EventBody;
pub use ids::{ChangeId, IdError, ReviewId};
pub use request::ChangeRequest;
pub use review::{ReviewPayload, ReviewRecord};
