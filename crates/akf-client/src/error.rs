//! Client error types.

use std::net::SocketAddr;
use std::time::Duration;

use akf_dispatch::codes;
use akf_rpc::RpcError;
use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The broker was not reachable and the caller did not ask to wait.
    #[error("dispatch broker at {addr} unreachable: {source}")]
    BrokerUnreachable {
        /// Broker address.
        addr: SocketAddr,
        /// Last connection failure.
        source: std::io::Error,
    },

    /// Connecting failed for a reason other than the peer not being up yet.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Target address.
        addr: SocketAddr,
        /// Underlying failure.
        source: std::io::Error,
    },

    /// The host name could not be resolved.
    #[error("invalid address {0}")]
    InvalidAddress(String),

    /// The broker does not know this capability.
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    /// The capability has no running worker.
    #[error("capability not running: {0}")]
    NotRunning(String),

    /// The broker failed to launch the capability.
    #[error("broker failed to launch {capability}: {message}")]
    LaunchFailed {
        /// Capability name.
        capability: String,
        /// Broker's error message.
        message: String,
    },

    /// The handshake did not finish before the caller's deadline.
    #[error("gave up connecting to {capability} after {deadline:?}")]
    DeadlineExceeded {
        /// Capability being acquired.
        capability: String,
        /// The deadline that elapsed.
        deadline: Duration,
    },

    /// The caller cancelled the handshake.
    #[error("connection to {0} cancelled")]
    Cancelled(String),

    /// The handle was already closed.
    #[error("connection to {0} is closed")]
    Closed(String),

    /// Transport or remote failure.
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Map a broker RPC failure onto the named broker errors.
    pub(crate) fn from_broker(err: RpcError, capability: &str) -> Self {
        match err {
            RpcError::Remote {
                code,
                message,
                data,
            } => match code {
                codes::UNKNOWN_CAPABILITY => Self::UnknownCapability(capability.to_string()),
                codes::NOT_RUNNING => Self::NotRunning(capability.to_string()),
                codes::LAUNCH_FAILED => Self::LaunchFailed {
                    capability: capability.to_string(),
                    message,
                },
                _ => Self::Rpc(RpcError::Remote {
                    code,
                    message,
                    data,
                }),
            },
            other => Self::Rpc(other),
        }
    }

    /// Check if this is a broker-reported caller error.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::UnknownCapability(_) | Error::NotRunning(_))
    }

    /// Check if the handshake gave up because of the caller's bound.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::DeadlineExceeded { .. } | Error::Cancelled(_))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(code: i64) -> RpcError {
        RpcError::Remote {
            code,
            message: "boom".into(),
            data: None,
        }
    }

    #[test]
    fn test_broker_codes_map_to_named_errors() {
        assert!(matches!(
            Error::from_broker(remote(codes::UNKNOWN_CAPABILITY), "X"),
            Error::UnknownCapability(n) if n == "X"
        ));
        assert!(matches!(
            Error::from_broker(remote(codes::NOT_RUNNING), "X"),
            Error::NotRunning(_)
        ));
        assert!(matches!(
            Error::from_broker(remote(codes::LAUNCH_FAILED), "X"),
            Error::LaunchFailed { message, .. } if message == "boom"
        ));
        assert!(matches!(
            Error::from_broker(remote(-32603), "X"),
            Error::Rpc(RpcError::Remote { code: -32603, .. })
        ));
        assert!(matches!(
            Error::from_broker(RpcError::ConnectionClosed, "X"),
            Error::Rpc(RpcError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_classification() {
        assert!(Error::NotRunning("X".into()).is_caller_error());
        assert!(Error::Cancelled("X".into()).is_aborted());
        assert!(!Error::Closed("X".into()).is_aborted());
    }
}
