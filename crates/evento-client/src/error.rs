use evento_protocol::codes;
use thiserror::Error;

/// Error type for client-side operations.
///
/// Transport failures fold into [`ClientError::Network`]; the server never
/// emits that code itself.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{code}: {message}")]
    Api { code: String, message: String },
    #[error("malformed server response: {0}")]
    Protocol(String),
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}

impl ClientError {
    /// The wire-style code for this error.
    pub fn code(&self) -> &str {
        match self {
            ClientError::Network(_) => codes::NETWORK_ERROR,
            ClientError::Api { code, .. } => code,
            ClientError::Protocol(_) | ClientError::Sqlite(_) | ClientError::Json(_) => {
                codes::INTERNAL
            }
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        self.code() == codes::STREAM_VERSION_CONFLICT
    }
}
