//! Broker control protocol: method names, parameter shapes and error codes.
//!
//! Shared with the host-side client so both ends agree on the encoding.

use serde::{Deserialize, Serialize};

/// Method names understood by the broker.
pub mod methods {
    /// `start {name} -> u16`
    pub const START: &str = "start";
    /// `stop {name} -> null`
    pub const STOP: &str = "stop";
    /// `list_available -> [string]`
    pub const LIST_AVAILABLE: &str = "list_available";
    /// `list_running -> {name: port}`
    pub const LIST_RUNNING: &str = "list_running";
}

/// JSON-RPC error codes for the named broker failures.
pub mod codes {
    /// Name not in the capability registry.
    pub const UNKNOWN_CAPABILITY: i64 = -32001;
    /// No running worker for the name.
    pub const NOT_RUNNING: i64 = -32002;
    /// Worker failed to start.
    pub const LAUNCH_FAILED: i64 = -32003;
}

/// Parameters of `start` and `stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameParams {
    /// Capability name.
    pub name: String,
}

impl NameParams {
    /// Create params for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Prefix of the single stdout line a worker process prints once it listens.
pub const PORT_LINE_PREFIX: &str = "AKF_CAPABILITY_PORT=";

/// Environment variable telling a configured worker which interface to bind.
pub const BIND_ENV: &str = "AKF_CAPABILITY_BIND";

/// Format the port announcement line.
pub fn port_line(port: u16) -> String {
    format!("{}{}", PORT_LINE_PREFIX, port)
}

/// Parse a port announcement line.
pub fn parse_port_line(line: &str) -> Option<u16> {
    line.trim().strip_prefix(PORT_LINE_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_line() {
        assert_eq!(port_line(40123), "AKF_CAPABILITY_PORT=40123");
        assert_eq!(parse_port_line("AKF_CAPABILITY_PORT=40123\n"), Some(40123));
        assert_eq!(parse_port_line("AKF_CAPABILITY_PORT=99999"), None);
        assert_eq!(parse_port_line("listening on 40123"), None);
    }
}
