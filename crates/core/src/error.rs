//! Unified error types for lantern.
//!
//! Cache misses and stale generations are not errors: misses surface as
//! `None` and stale generations are removed by the activate phase.

use tokio_rusqlite::rusqlite;

/// Unified error types for the lantern worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., a relative request URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The network fetch rejected (connection refused, DNS, reset...).
    #[error("NETWORK_FAILURE: {0}")]
    Network(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A precache manifest entry could not be fetched and stored.
    #[error("PRECACHE_FAILED: {path}: {reason}")]
    PrecacheFailed { path: String, reason: String },

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored headers could not be encoded or decoded.
    #[error("CACHE_ERROR: serialization failed: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error belongs to the network-failure family that the
    /// caching strategies recover from locally.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Error::Network(_) | Error::FetchTimeout(_) | Error::FetchTooLarge(_))
    }
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
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Network("connection refused".to_string());
        assert!(err.to_string().contains("NETWORK_FAILURE"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_precache_failed_display() {
        let err = Error::PrecacheFailed { path: "/sw.js".into(), reason: "status 404".into() };
        assert_eq!(err.to_string(), "PRECACHE_FAILED: /sw.js: status 404");
    }

    #[test]
    fn test_network_failure_family() {
        assert!(Error::Network("x".into()).is_network_failure());
        assert!(Error::FetchTimeout("x".into()).is_network_failure());
        assert!(Error::FetchTooLarge("x".into()).is_network_failure());
        assert!(!Error::InvalidUrl("x".into()).is_network_failure());
        assert!(!Error::MigrationFailed("x".into()).is_network_failure());
    }
}
