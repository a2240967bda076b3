use thiserror::Error;

use crate::protocol::{McpErrorCode, McpErrorResponse};

/// Failure while introspecting the catalog at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot connect to catalog: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("catalog query failed: {0}")]
    Query(#[source] sqlx::Error),
}

/// A catalog row that cannot become an [`IndexDescriptor`](crate::catalog::IndexDescriptor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("index on {subject} has no key columns")]
    EmptyKeys { subject: String },
    #[error("index on {subject} lists key {key} more than once")]
    DuplicateKey { subject: String, key: String },
}

/// Failure of a single lookup call. Never affects other calls.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("uri {uri} does not match {template}")]
    UriMismatch { uri: String, template: String },
    #[error("cannot connect to database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("lookup query failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error("cannot serialize rows: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl LookupError {
    pub fn code(&self) -> McpErrorCode {
        match self {
            Self::InvalidArguments(_) => McpErrorCode::InvalidArguments,
            Self::UriMismatch { .. } => McpErrorCode::ResourceNotFound,
            Self::Connect(_) => McpErrorCode::DatabaseUnavailable,
            Self::Query(_) => McpErrorCode::QueryFailed,
            Self::Serialize(_) => McpErrorCode::InternalError,
        }
    }
}

/// Lookup failures keep their detail in the message; the code is stable.
impl From<&LookupError> for McpErrorResponse {
    fn from(err: &LookupError) -> Self {
        McpErrorResponse::new(err.code(), err.to_string())
    }
}

/// Fatal failure of the stdio serving loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode response: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("response writer stopped: {0}")]
    Writer(#[from] tokio::task::JoinError),
}
