//! Error types for the sync worker.
//!
//! None of these reach the owning application: a running dispatcher keeps
//! retrying until it converges or is shut down. They exist so collaborator
//! implementations can report failures and the worker can log them.

/// Failure reported by the remote endpoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },
}

impl RemoteError {
    pub fn rpc(code: i32, message: impl Into<String>) -> Self {
        RemoteError::Rpc {
            code,
            message: message.into(),
        }
    }
}

/// Failure reported by the local store or the operation log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Result type alias for store access.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
