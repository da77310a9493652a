//! Error types for RPC operations.

use thiserror::Error;

use crate::protocol::JsonRpcError;

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Error type for RPC operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Failed to reach or talk to the peer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed frame or JSON-RPC envelope.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer answered with a JSON-RPC error object.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Error code from the peer.
        code: i64,
        /// Error message from the peer.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// Connection closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Timeout waiting for a response.
    #[error("timeout waiting for response")]
    Timeout,
}

impl RpcError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// The remote error code, if the peer answered with an error object.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<JsonRpcError> for RpcError {
    fn from(err: JsonRpcError) -> Self {
        Self::Remote {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RpcError::transport("connection refused");
        assert!(err.to_string().contains("transport"));
        assert!(err.to_string().contains("connection refused"));

        let err: RpcError = JsonRpcError::new(-32001, "unknown capability").into();
        assert!(err.to_string().contains("-32001"));
        assert_eq!(err.remote_code(), Some(-32001));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: RpcError = io_err.into();
        assert!(matches!(err, RpcError::Io(_)));
        assert_eq!(err.remote_code(), None);
    }
}
