//! Filesystem archive: one directory per change id, fixed file names,
//! write-once records. This is the durable audit trail; nothing in it is ever
//! rewritten or deleted.
//!
//! Layout under the archive root:
//!
//! ```text
//! <root>/<change_id>/request.json
//!                    change.json
//!                    diff.patch
//!                    review-use-consent.json
//!                    review-apply-approval.json
//!                    outcome.json
//! ```

use serde::Serialize;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use sw_core::archive::Archive;
use sw_core::error::ArchiveError;
use sw_core::types::enums::ReviewStage;
use sw_core::types::ids::ChangeId;
use sw_core::types::{
    ArchiveEntry, ArchiveOutcome, ChangeRequest, PreprocessedChange, ReviewRecord,
};

const REQUEST_FILE: &str = "request.json";
const CHANGE_FILE: &str = "change.json";
const PATCH_FILE: &str = "diff.patch";
const OUTCOME_FILE: &str = "outcome.json";

fn review_file(stage: ReviewStage) -> &'static str {
    match stage {
        ReviewStage::UseConsent => "review-use-consent.json",
        ReviewStage::ApplyApproval => "review-apply-approval.json",
    }
}

pub struct FsArchive {
    root: PathBuf,
}

impl FsArchive {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_json<T: Serialize>(
        &self,
        change_id: &ChangeId,
        file_name: &str,
        value: &T,
    ) -> Result<(), ArchiveError> {
        let body = serde_json::to_vec_pretty(value).map_err(|err| ArchiveError::Serialize {
            message: err.to_string(),
        })?;
        self.write_once(change_id, file_name, &body)
    }

    /// Creates the record, refusing to overwrite. File and directory are
    /// fsynced so a settled outcome survives a crash.
    fn write_once(
        &self,
        change_id: &ChangeId,
        file_name: &str,
        body: &[u8],
    ) -> Result<(), ArchiveError> {
        let dir = self.entry_dir(change_id);
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        let path = dir.join(file_name);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::AlreadyExists {
                    ArchiveError::AlreadyRecorded {
                        path: path.display().to_string(),
                    }
                } else {
                    ArchiveError::Io {
                        path: path.display().to_string(),
                        message: err.to_string(),
                    }
                }
            })?;
        file.write_all(body)
            .and_then(|()| file.sync_all())
            .map_err(io_error(&path))?;
        if let Ok(dir_handle) = fs::File::open(&dir) {
            if let Err(err) = dir_handle.sync_all() {
                log::warn!("cannot sync archive dir {}: {err}", dir.display());
            }
        }
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        dir: &Path,
        file_name: &str,
    ) -> Result<Option<T>, ArchiveError> {
        let path = dir.join(file_name);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(io_error(&path))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| ArchiveError::Corrupt {
                path: path.display().to_string(),
                message: err.to_string(),
            })
    }
}

impl Archive for FsArchive {
    fn entry_dir(&self, change_id: &ChangeId) -> PathBuf {
        self.root.join(change_id.as_str())
    }

    fn is_settled(&self, change_id: &ChangeId) -> Result<bool, ArchiveError> {
        Ok(self.entry_dir(change_id).join(OUTCOME_FILE).exists())
    }

    fn record_request(
        &self,
        change_id: &ChangeId,
        request: &ChangeRequest,
    ) -> Result<(), ArchiveError> {
        self.write_json(change_id, REQUEST_FILE, request)
    }

    fn record_change(&self, change: &PreprocessedChange) -> Result<(), ArchiveError> {
        self.write_json(&change.change_id, CHANGE_FILE, change)?;
        self.write_once(&change.change_id, PATCH_FILE, change.raw_diff.as_bytes())
    }

    fn record_review(
        &self,
        change_id: &ChangeId,
        review: &ReviewRecord,
    ) -> Result<(), ArchiveError> {
        self.write_json(change_id, review_file(review.stage), review)
    }

    fn record_outcome(&self, outcome: &ArchiveOutcome) -> Result<(), ArchiveError> {
        self.write_json(&outcome.change_id, OUTCOME_FILE, outcome)
    }

    fn load(&self, change_id: &ChangeId) -> Result<Option<ArchiveEntry>, ArchiveError> {
        let dir = self.entry_dir(change_id);
        if !dir.exists() {
            return Ok(None);
        }
        let mut reviews = Vec::new();
        for stage in [ReviewStage::UseConsent, ReviewStage::ApplyApproval] {
            if let Some(review) = self.read_json::<ReviewRecord>(&dir, review_file(stage))? {
                reviews.push(review);
            }
        }
        Ok(Some(ArchiveEntry {
            request: self.read_json(&dir, REQUEST_FILE)?,
            change: self.read_json(&dir, CHANGE_FILE)?,
            reviews,
            outcome: self.read_json(&dir, OUTCOME_FILE)?,
        }))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |err| ArchiveError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
