use crate::normalize::LintViolation;
use crate::types::enums::PipelineState;
use thiserror::Error;

/// Malformed or ambiguous input. Recoverable: returned to the agent with a
/// stable code and a remediation hint so it can resubmit without a human.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("summary is blank")]
    SummaryBlank,
    #[error("summary too short: {len} characters, minimum {min}")]
    SummaryTooShort { min: usize, len: usize },
    #[error("summary too long: {len} characters, maximum {max}")]
    SummaryTooLong { max: usize, len: usize },
    #[error("unified diff is empty")]
    DiffEmpty,
    #[error("unified diff does not parse at line {line}: {message}")]
    DiffUnparsable { line: usize, message: String },
    #[error("diff names no target path")]
    NoPaths,
    #[error("diff touches {count} paths; exactly one is allowed")]
    MultiplePaths { count: usize },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SummaryBlank => "summary_blank",
            Self::SummaryTooShort { .. } => "summary_too_short",
            Self::SummaryTooLong { .. } => "summary_too_long",
            Self::DiffEmpty => "diff_empty",
            Self::DiffUnparsable { .. } => "diff_unparsable",
            Self::NoPaths => "no_paths",
            Self::MultiplePaths { .. } => "multiple_paths",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Self::SummaryBlank | Self::SummaryTooShort { .. } => {
                "provide a concise, meaningful summary of at least 10 characters"
            }
            Self::SummaryTooLong { .. } => "shorten the summary to at most 2000 characters",
            Self::DiffEmpty | Self::DiffUnparsable { .. } => {
                "send a unified diff with ---/+++ file headers and @@ hunk headers"
            }
            Self::NoPaths | Self::MultiplePaths { .. } => {
                "split the change so each request touches exactly one path"
            }
        }
    }
}

/// Unparsable or policy-violating diff content. Recoverable.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("path escapes the repository root: {path}")]
    PathOutsideRepo { path: String },
    #[error("source path does not exist: {path}")]
    SourceMissing { path: String },
    #[error("target path already exists: {path}")]
    PathExists { path: String },
    #[error("source path is not a regular file: {path}")]
    NotAFile { path: String },
    #[error("source content is not valid UTF-8: {path}")]
    BinaryContent { path: String },
    #[error("rename from {from_path} to {destination} also edits content; submit as two requests")]
    RenameWithEdits {
        from_path: String,
        destination: String,
    },
    #[error("hunk does not match base content of {path} at line {line}: {detail}")]
    HunkMismatch {
        path: String,
        line: usize,
        detail: String,
    },
}

impl AnalysisError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathOutsideRepo { .. } => "path_outside_repo",
            Self::SourceMissing { .. } => "source_missing",
            Self::PathExists { .. } => "path_exists",
            Self::NotAFile { .. } => "not_a_file",
            Self::BinaryContent { .. } => "binary_content",
            Self::RenameWithEdits { .. } => "rename_with_edits",
            Self::HunkMismatch { .. } => "hunk_mismatch",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Self::PathOutsideRepo { .. } => {
                "use a relative path inside the repository, without '..' components"
            }
            Self::SourceMissing { .. } => "the diff must apply to a file that exists in the repo",
            Self::PathExists { .. } => "creations must target a path that does not exist yet",
            Self::NotAFile { .. } => "only regular files can be changed",
            Self::BinaryContent { .. } => "binary content is not governed; text files only",
            Self::RenameWithEdits { .. } => {
                "submit the rename and the content edit as two separate requests"
            }
            Self::HunkMismatch { .. } => {
                "regenerate the diff against the current content of the file"
            }
        }
    }
}

/// Lint violations with no auto-fix. Recoverable; each violation is reported
/// individually so the agent can resubmit precisely.
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("lint failed with {} violation(s)", violations.len())]
    LintFailed { violations: Vec<LintViolation> },
}

impl NormalizationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::LintFailed { .. } => "lint_failed",
        }
    }

    pub fn hint(&self) -> &'static str {
        "fix each reported violation and resubmit the diff"
    }
}

/// Out-of-order, duplicate, or unknown checkpoint traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown review id: {review_id}")]
    UnknownReview { review_id: String },
    #[error("review already decided: {review_id}")]
    AlreadyDecided { review_id: String },
    #[error("unknown change id: {change_id}")]
    UnknownChange { change_id: String },
    #[error("change already archived: {change_id}")]
    AlreadyProcessed { change_id: String },
    #[error("change already in flight: {change_id}")]
    InFlight { change_id: String },
    #[error("call out of order for {change_id}: pipeline is {state:?}")]
    OutOfOrder {
        change_id: String,
        state: PipelineState,
    },
}

/// Fatal for the owning request. The working tree is reverted before this
/// surfaces; the request terminates in a failed terminal state.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("base content of {path} no longer matches the approved diff: {detail}")]
    BaseMismatch { path: String, detail: String },
    #[error("post-image verification failed for {path}")]
    PostImageMismatch { path: String },
    #[error("target path already exists: {path}")]
    TargetExists { path: String },
    #[error("target path missing: {path}")]
    TargetMissing { path: String },
    #[error("filesystem failure on {path}: {message}")]
    Io { path: String, message: String },
    #[error(transparent)]
    Vcs(#[from] sw_vcs::VcsError),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive record already written: {path}")]
    AlreadyRecorded { path: String },
    #[error("archive io failure on {path}: {message}")]
    Io { path: String, message: String },
    #[error("archive record corrupt at {path}: {message}")]
    Corrupt { path: String, message: String },
    #[error("serialization failure: {message}")]
    Serialize { message: String },
}

#[derive(Debug, Error)]
pub enum StewardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Vcs(#[from] sw_vcs::VcsError),
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl StewardError {
    /// Stable machine code for the transport layer's error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.code(),
            Self::Analysis(err) => err.code(),
            Self::Normalization(err) => err.code(),
            Self::Protocol(err) => match err {
                ProtocolError::UnknownReview { .. } | ProtocolError::UnknownChange { .. } => {
                    "not_found"
                }
                ProtocolError::AlreadyDecided { .. }
                | ProtocolError::AlreadyProcessed { .. }
                | ProtocolError::InFlight { .. } => "conflict",
                ProtocolError::OutOfOrder { .. } => "out_of_order",
            },
            Self::Apply(_) => "apply_failed",
            Self::Archive(_) => "archive_failed",
            Self::Vcs(_) => "vcs_failed",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Remediation hint for agent-facing, recoverable errors.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Validation(err) => Some(err.hint()),
            Self::Analysis(err) => Some(err.hint()),
            Self::Normalization(err) => Some(err.hint()),
            _ => None,
        }
    }

    /// True for errors the agent can fix by resubmitting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Analysis(_) | Self::Normalization(_) | Self::Protocol(_)
        )
    }
}
