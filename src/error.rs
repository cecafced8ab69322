//! Centralized error types for attachpoll.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the attachpoll library.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Network, TLS or protocol failure while talking to the mail source.
    #[error("Network error: {0}")]
    Network(String),

    /// The mail source rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The requested mailbox does not exist on the source.
    #[error("Mailbox not found: {0}")]
    MailboxNotFound(String),

    /// The source refused the search predicate itself.
    #[error("Search predicate rejected by source: {0}")]
    UnsupportedPredicate(String),

    /// The cursor database failed.
    #[error("Cursor store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Schema migration of the cursor database failed.
    #[error("Cursor store migration failed: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    /// Invalid or incomplete configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, SyncError>`.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is expected to clear up by itself on a later cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Io { .. } | Self::UnsupportedPredicate(_)
        )
    }
}

/// Network-side `io::Error`s (timeouts, resets) carry no useful path.
impl From<std::io::Error> for SyncError {
    fn from(source: std::io::Error) -> Self {
        Self::Network(source.to_string())
    }
}
