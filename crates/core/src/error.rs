//! Unified error types for precache.
//!
//! Every variant renders with a stable code prefix so failures are easy to
//! grep for in structured logs.

use tokio_rusqlite::rusqlite;

/// Unified error types for the offline cache manager and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., storing a non-GET request).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Transport-level failure (no connectivity, DNS failure, timeout).
    ///
    /// HTTP error statuses are responses, never this variant.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// A manifest asset resolved to a non-OK status during install.
    #[error("BAD_STATUS: {url} returned {status}")]
    BadStatus { url: String, status: u16 },

    /// The install phase failed; the worker version must not activate.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),

    /// One or more stale generations could not be deleted.
    #[error("ACTIVATE_FAILED: could not delete {}", .failed.join(", "))]
    ActivateFailed { failed: Vec<String> },

    /// A lifecycle event was dispatched in a state that does not allow it.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptEntry(err.to_string())
    }
}
