//! Error types for the review engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the engine [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by decks, the scheduler, review sessions and the repository.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("invalid score '{0}'")]
    InvalidScore(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("card not found: {0}")]
    CardNotFound(String),

    #[error("deck not found: {0}")]
    DeckNotFound(String),

    #[error("deck '{0}' already exists")]
    DeckExists(String),

    #[error("no cards left in the review queue")]
    EmptyQueue,

    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data in '{}': {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode deck '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Malformed {
            path: path.into(),
            source,
        }
    }
}
