use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the consolidation engine.
///
/// Per-file extraction problems never show up here: they are recorded on the
/// document itself and the run carries on.
#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid exclude pattern '{pattern}': {source}")]
    Exclude {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("another run holds the lock at {}", path.display())]
    LockHeld { path: PathBuf },

    #[error("failed to encode ledger record: {0}")]
    Ledger(String),
}

impl ConsolidateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConsolidateError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsolidateError>;
