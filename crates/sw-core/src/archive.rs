//! Storage seam for the audit trail. The orchestrator only talks to this
//! trait; the filesystem implementation lives in its own crate.

use crate::error::ArchiveError;
use crate::types::ids::ChangeId;
use crate::types::{ArchiveEntry, ArchiveOutcome, ChangeRequest, PreprocessedChange, ReviewRecord};
use std::path::PathBuf;

/// Append-only archive of one directory-equivalent per change id. Every
/// record is written exactly once; a second write of the same record is an
/// error, and the raw diff is stored verbatim alongside the structured
/// records.
pub trait Archive: Send + Sync + 'static {
    /// Where this change's records live (or would live).
    fn entry_dir(&self, change_id: &ChangeId) -> PathBuf;

    /// True if the change already has a terminal outcome on record.
    fn is_settled(&self, change_id: &ChangeId) -> Result<bool, ArchiveError>;

    fn record_request(
        &self,
        change_id: &ChangeId,
        request: &ChangeRequest,
    ) -> Result<(), ArchiveError>;

    /// Stores the preprocessed change plus the raw diff patch file.
    fn record_change(&self, change: &PreprocessedChange) -> Result<(), ArchiveError>;

    fn record_review(
        &self,
        change_id: &ChangeId,
        review: &ReviewRecord,
    ) -> Result<(), ArchiveError>;

    /// The terminal record. After this returns, [`Archive::is_settled`] is
    /// true forever.
    fn record_outcome(&self, outcome: &ArchiveOutcome) -> Result<(), ArchiveError>;

    fn load(&self, change_id: &ChangeId) -> Result<Option<ArchiveEntry>, ArchiveError>;
}
