//! Error types for broker operations.

use akf_rpc::{JsonRpcError, RpcError};
use serde_json::json;
use thiserror::Error;

use crate::protocol::codes;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Error type for broker operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The name is not in the capability registry.
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    /// The capability has no running worker.
    #[error("capability not running: {0}")]
    NotRunning(String),

    /// The worker could not be started or never reported its port.
    #[error("failed to launch {capability}: {reason}")]
    LaunchFailed {
        /// Capability that failed to launch.
        capability: String,
        /// What went wrong.
        reason: String,
    },

    /// Transport or protocol failure while serving.
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// Create a launch failure.
    pub fn launch_failed(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LaunchFailed {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// The JSON-RPC error sent back to a remote caller.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            Self::UnknownCapability(name) => {
                JsonRpcError::new(codes::UNKNOWN_CAPABILITY, self.to_string())
                    .with_data(json!({ "capability": name }))
            }
            Self::NotRunning(name) => JsonRpcError::new(codes::NOT_RUNNING, self.to_string())
                .with_data(json!({ "capability": name })),
            Self::LaunchFailed { capability, .. } => {
                JsonRpcError::new(codes::LAUNCH_FAILED, self.to_string())
                    .with_data(json!({ "capability": capability }))
            }
            Self::Rpc(_) | Self::Io(_) => JsonRpcError::internal(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_failures_carry_capability() {
        let err = DispatchError::UnknownCapability("Nope".into()).to_rpc_error();
        assert_eq!(err.code, codes::UNKNOWN_CAPABILITY);
        assert_eq!(err.data, Some(json!({ "capability": "Nope" })));

        let err = DispatchError::NotRunning("Chromium".into()).to_rpc_error();
        assert_eq!(err.code, codes::NOT_RUNNING);

        let err = DispatchError::launch_failed("Chromium", "exited early").to_rpc_error();
        assert_eq!(err.code, codes::LAUNCH_FAILED);
        assert!(err.message.contains("exited early"));
    }

    #[test]
    fn test_io_maps_to_internal() {
        let err = DispatchError::Io(std::io::Error::other("boom")).to_rpc_error();
        assert_eq!(err.code, JsonRpcError::INTERNAL_ERROR);
    }
}
