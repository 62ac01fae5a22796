//! Error types for token fetch and storage operations

/// Errors from CSRF token operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token endpoint returned {0}")]
    Status(String),

    #[error("no CSRF token in response: {0}")]
    MissingToken(String),

    #[error("session store parse error: {0}")]
    StoreParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for token operations.
pub type Result<T> = std::result::Result<T, Error>;
