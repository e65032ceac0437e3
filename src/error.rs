//! Crate-wide error type.

use std::io;

use thiserror::Error;

/// Errors surfaced by the index maintenance engine.
///
/// Most per-entity failures never reach callers: they are logged and the entity is
/// treated as absent for the current run. What does propagate is configuration,
/// index-open, repository failures during a full reindex, and cancellation.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("could not open index directory: {0}")]
    OpenDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

    #[error("invalid query: {0}")]
    InvalidQuery(#[from] tantivy::query::QueryParserError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index schema mismatch: {reason}")]
    SchemaMismatch { reason: String },

    #[error("invalid engine configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("repository error: {reason}")]
    Repository { reason: String },

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("event bus is closed")]
    BusClosed,

    #[error("collector is no longer running")]
    CollectorClosed,

    #[error("operation cancelled")]
    Cancelled,
}

impl IndexError {
    pub(crate) fn repository(reason: impl Into<String>) -> Self {
        Self::Repository {
            reason: reason.into(),
        }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        Self::LockPoisoned(format!("{what} lock poisoned"))
    }

    /// Whether this error came from a cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
