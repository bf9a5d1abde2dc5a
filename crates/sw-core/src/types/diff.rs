use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LineKind {
    Context,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkLine {
    pub kind: LineKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

/// One file's worth of a parsed unified diff. `old_path`/`new_path` are `None`
/// for the `/dev/null` side of creations and deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub is_rename: bool,
    pub hunks: Vec<Hunk>,
    /// The post-image ends without a trailing newline.
    pub post_missing_newline: bool,
    /// The pre-image ends without a trailing newline.
    pub base_missing_newline: bool,
}

impl FileDiff {
    /// The single path this diff targets: the surviving side for creations and
    /// deletions, the source side otherwise.
    pub fn target_path(&self) -> Option<&str> {
        self.old_path.as_deref().or(self.new_path.as_deref())
    }

    pub fn additions(&self) -> usize {
        self.count_lines(LineKind::Added)
    }

    pub fn removals(&self) -> usize {
        self.count_lines(LineKind::Removed)
    }

    fn count_lines(&self, kind: LineKind) -> usize {
        self.hunks
            .iter()
            .flat_map(|hunk| hunk.lines.iter())
            .filter(|line| line.kind == kind)
            .count()
    }
}
