use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions for a single `memopt` run.
///
/// Unreadable documents are not errors: they become load warnings and the
/// document is skipped.
#[derive(Debug, Error)]
pub enum MemoptError {
    #[error("workspace not found: {}", .0.display())]
    WorkspaceNotFound(PathBuf),

    #[error("invalid config file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("could not read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("could not write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("could not back up {}: {source}", path.display())]
    Backup { path: PathBuf, source: io::Error },

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, MemoptError>;
