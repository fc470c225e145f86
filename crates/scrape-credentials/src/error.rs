//! Error types for the credential store

/// Errors from credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(String),

    #[error("credential file parse error: {0}")]
    Parse(String),

    #[error("credential not found: {0}")]
    NotFound(String),

    #[error("credential already exists: {0}")]
    Duplicate(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
