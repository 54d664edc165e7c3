use evento_protocol::codes;
use thiserror::Error;

/// Error type for storage and registry operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),
    #[error("namespace already exists: {0}")]
    NamespaceExists(String),
    #[error("version conflict on stream {stream}: expected {expected}, stream at {actual}")]
    VersionConflict {
        stream: String,
        expected: i64,
        actual: i64,
    },
    #[error("position already occupied: ({stream}, {position})")]
    PositionExists { stream: String, position: i64 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// The wire error code this error surfaces as.
    pub fn wire_code(&self) -> &'static str {
        match self {
            StoreError::NamespaceNotFound(_) => codes::NAMESPACE_NOT_FOUND,
            StoreError::NamespaceExists(_) => codes::NAMESPACE_EXISTS,
            StoreError::VersionConflict { .. } => codes::STREAM_VERSION_CONFLICT,
            StoreError::PositionExists { .. } => codes::POSITION_EXISTS,
            StoreError::InvalidArgument(_) => codes::INVALID_ARGUMENT,
            StoreError::IntegrityCheckFailed(_)
            | StoreError::Sqlite(_)
            | StoreError::Io(_)
            | StoreError::Json(_) => codes::INTERNAL,
        }
    }
}
