//! Unified error types for memento.
//!
//! Every failure a retrieval can end in maps onto one variant here, so callers
//! can pick the right response without inspecting message strings.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the memento crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No capture matches the query.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// The access-control oracle rejected the URL.
    #[error("ACCESS_DENIED: {url} (upstream status {status})")]
    AccessDenied { url: String, status: u16 },

    /// A PWID could not be decoded or parsed.
    #[error("MALFORMED_IDENTIFIER: {0}")]
    MalformedIdentifier(String),

    /// Index, storage, access or render service unreachable or misbehaving.
    #[error("UPSTREAM_UNAVAILABLE: {0}")]
    UpstreamUnavailable(String),

    /// Compressed member or record container could not be decoded.
    #[error("DECODE_FAILURE: {0}")]
    DecodeFailure(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Unparseable target or capture timestamp.
    #[error("INVALID_TIMESTAMP: {0}")]
    InvalidTimestamp(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether this error means "never archived" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
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

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message, data) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone(), None),
            Error::NotFound(msg) => (-32001, msg.clone(), None),
            Error::Database(e) => (-32002, e.to_string(), None),
            Error::MigrationFailed(msg) => (-32002, msg.clone(), None),
            Error::InvalidUrl(msg) => (-32003, msg.clone(), None),
            Error::AccessDenied { url, status } => (
                -32004,
                format!("{url} is not available for legal reasons"),
                Some(serde_json::json!({ "status": status })),
            ),
            Error::MalformedIdentifier(msg) => (-32005, msg.clone(), None),
            Error::InvalidTimestamp(msg) => (-32006, msg.clone(), None),
            Error::UpstreamUnavailable(msg) => (-32007, msg.clone(), None),
            Error::DecodeFailure(msg) => (-32008, msg.clone(), None),
        };

        McpError { code: ErrorCode(code), message: message.into(), data }
    }
}
