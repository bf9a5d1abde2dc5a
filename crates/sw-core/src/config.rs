//! Runtime configuration, read from `.steward/config.toml` under the repo
//! root. Environment variables override the file: `STEWARD_REPO_ROOT` and
//! `STEWARD_ARCHIVE_ROOT`.

use crate::error::StewardError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".steward";
pub const CONFIG_FILE: &str = "config.toml";

pub const REPO_ROOT_ENV: &str = "STEWARD_REPO_ROOT";
pub const ARCHIVE_ROOT_ENV: &str = "STEWARD_ARCHIVE_ROOT";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StewardConfig {
    /// Where archive entries are written, relative to the repo root unless
    /// absolute.
    pub archive_dir: PathBuf,
    /// Event bus buffer size.
    pub event_capacity: usize,
}

impl Default for StewardConfig {
    fn default() -> Self {
        Self {
            archive_dir: Path::new(CONFIG_DIR).join("archive"),
            event_capacity: sw_events::EventBus::DEFAULT_CAPACITY,
        }
    }
}

impl StewardConfig {
    /// Loads from `<repo_root>/.steward/config.toml`; a missing file yields
    /// the defaults.
    pub fn load(repo_root: &Path) -> Result<Self, StewardError> {
        let path = repo_root.join(CONFIG_DIR).join(CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|err| StewardError::Internal {
                message: format!("cannot read {}: {err}", path.display()),
            })?;
            toml::from_str::<Self>(&raw).map_err(|err| StewardError::Internal {
                message: format!("cannot parse {}: {err}", path.display()),
            })?
        } else {
            Self::default()
        };
        if let Ok(archive_root) = std::env::var(ARCHIVE_ROOT_ENV) {
            config.archive_dir = PathBuf::from(archive_root);
        }
        Ok(config)
    }

    /// Absolute archive root for the given repo.
    pub fn archive_root(&self, repo_root: &Path) -> PathBuf {
        if self.archive_dir.is_absolute() {
            self.archive_dir.clone()
        } else {
            repo_root.join(&self.archive_dir)
        }
    }
}

/// Repo root from `STEWARD_REPO_ROOT`, falling back to the current directory.
pub fn repo_root_from_env() -> PathBuf {
    std::env::var(REPO_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
