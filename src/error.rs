//! Error types for the SPA server
//!
//! Request-time failures map onto HTTP status codes; startup failures are
//! fatal and surface through `main`.

use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Number of request path characters kept in error logs.
pub const LOG_PATH_LIMIT: usize = 32;

// == Serve Error Enum ==
/// Request-time error taxonomy.
#[derive(Error, Debug)]
pub enum ServeError {
    /// Fallback chain exhausted or the filesystem reports absence
    #[error("not found: {0}")]
    NotFound(String),

    /// Path exists but cannot be read
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Method other than GET/HEAD (or POST to the CSP endpoint)
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Any other read failure
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ServeError {
    /// Classifies an I/O error raised while opening or reading `path`.
    pub fn from_io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ServeError::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => ServeError::PermissionDenied(path.to_string()),
            _ => ServeError::Io {
                path: path.to_string(),
                source: err,
            },
        }
    }

    /// Attributes an I/O failure to the request path instead of the
    /// candidate file it happened on. Other variants are unchanged.
    pub fn for_request(self, request_path: &str) -> Self {
        match self {
            ServeError::Io { source, .. } => ServeError::Io {
                path: request_path.to_string(),
                source,
            },
            other => other,
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServeError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ServeError::Io { path, source } = &self {
            error!("Opening file {}: {}", truncate_path(path), source);
        }

        // Only the reason phrase goes out, never filesystem detail
        let body = status.canonical_reason().unwrap_or("Error");
        (status, format!("{}\n", body)).into_response()
    }
}

/// Cuts a request path to at most [`LOG_PATH_LIMIT`] characters.
pub fn truncate_path(path: &str) -> &str {
    match path.char_indices().nth(LOG_PATH_LIMIT) {
        Some((idx, _)) => &path[..idx],
        None => path,
    }
}

// == Config Error Enum ==
/// Startup configuration errors. All of them abort startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("parsing config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("parsing '{key}' regexp: {source}")]
    InvalidRegex {
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid config value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("server root {0}")]
    Root(String),

    #[error("server index {0}")]
    Index(String),
}

// == Result Type Alias ==
/// Convenience Result type for request handling.
pub type Result<T> = std::result::Result<T, ServeError>;
