//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [agent]                      # guest-side dispatch broker
//! bind = "0.0.0.0"
//! port = 18861
//!
//! [client]                     # host-side handshake
//! retry_interval_ms = 1000
//! deadline_secs = 600
//!
//! [capabilities.Chromium]      # capability launched as an external command
//! command = "akf-chromium-driver"
//! args = ["--headless"]
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{ConfigError, Result};

/// Well-known port of the dispatch broker.
pub const DEFAULT_BROKER_PORT: u16 = 18861;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AkfConfig {
    /// Guest agent settings.
    pub agent: Option<AgentConfig>,

    /// Host-side connection settings.
    pub client: Option<ClientConfig>,

    /// Capabilities launched as external commands, keyed by capability name.
    pub capabilities: BTreeMap<String, CapabilityEntry>,

    /// Log output settings.
    pub logging: Option<LoggingConfig>,
}

impl AkfConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AkfConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: AkfConfig) {
        if other.agent.is_some() {
            self.agent = other.agent;
        }

        if other.client.is_some() {
            self.client = other.client;
        }

        for (name, entry) in other.capabilities {
            self.capabilities.insert(name, entry);
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Agent settings, falling back to defaults.
    pub fn agent(&self) -> AgentConfig {
        self.agent.clone().unwrap_or_default()
    }

    /// Client settings, falling back to defaults.
    pub fn client(&self) -> ClientConfig {
        self.client.clone().unwrap_or_default()
    }

    /// Logging settings, falling back to defaults.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<()> {
        for (name, entry) in &self.capabilities {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "capabilities".into(),
                    reason: "capability name must not be empty".into(),
                });
            }
            if entry.command.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: format!("capabilities.{}.command", name),
                    reason: "command must not be empty".into(),
                });
            }
        }

        if let Some(ref client) = self.client
            && client.retry_interval_ms == 0
        {
            return Err(ConfigError::Invalid {
                field: "client.retry_interval_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Guest-side dispatch broker settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Interface to listen on.
    pub bind: IpAddr,
    /// Broker control port.
    pub port: u16,
    /// How long a worker may take to report its port.
    pub launch_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_BROKER_PORT,
            launch_timeout_secs: 10,
        }
    }
}

impl AgentConfig {
    /// Socket address the broker binds.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Launch timeout as a duration.
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }
}

/// Host-side handshake settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker port on the guest.
    pub broker_port: u16,
    /// Whether to keep retrying while the broker is unreachable.
    pub wait_until_ready: bool,
    /// Pause between broker connection attempts.
    pub retry_interval_ms: u64,
    /// Timeout of a single connection attempt.
    pub connect_timeout_ms: u64,
    /// Overall bound on the handshake; unset means no bound.
    pub deadline_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_port: DEFAULT_BROKER_PORT,
            wait_until_ready: true,
            retry_interval_ms: 1000,
            connect_timeout_ms: 5000,
            deadline_secs: None,
        }
    }
}

impl ClientConfig {
    /// Retry interval as a duration.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Per-attempt connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Deadline as a duration.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// A capability served by an external command.
///
/// The command must bind an ephemeral port and print
/// `AKF_CAPABILITY_PORT=<port>` on its first stdout line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CapabilityEntry {
    /// Program to execute.
    pub command: String,
    /// Arguments to pass.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Short description shown by `services list`.
    #[serde(default)]
    pub description: Option<String>,
}

impl CapabilityEntry {
    /// Create an entry for `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling JSON logs; defaults to `<config dir>/logs`.
    pub directory: Option<PathBuf>,
    /// Whether to write the JSON log file at all.
    pub file: bool,
    /// Default console filter directive.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file: true,
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_defaults() {
        let config = AkfConfig::from_toml("").unwrap();
        assert_eq!(config, AkfConfig::default());
        assert_eq!(config.agent().port, DEFAULT_BROKER_PORT);
        assert!(config.client().wait_until_ready);
        assert_eq!(config.client().deadline(), None);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[agent]
bind = "127.0.0.1"
port = 19000
launch_timeout_secs = 3

[client]
broker_port = 19000
retry_interval_ms = 250
deadline_secs = 30

[capabilities.Chromium]
command = "akf-chromium-driver"
args = ["--headless"]
env = { DISPLAY = ":0" }

[logging]
file = false
level = "debug"
"#;
        let config = AkfConfig::from_toml(toml).unwrap();
        let agent = config.agent();
        assert_eq!(agent.bind_address().to_string(), "127.0.0.1:19000");
        assert_eq!(agent.launch_timeout(), Duration::from_secs(3));

        let client = config.client();
        assert_eq!(client.retry_interval(), Duration::from_millis(250));
        assert_eq!(client.deadline(), Some(Duration::from_secs(30)));
        // Unset fields keep defaults
        assert_eq!(client.connect_timeout_ms, 5000);

        let chromium = &config.capabilities["Chromium"];
        assert_eq!(chromium.command, "akf-chromium-driver");
        assert_eq!(chromium.args, vec!["--headless"]);
        assert_eq!(chromium.env["DISPLAY"], ":0");

        assert!(!config.logging().file);
        assert_eq!(config.logging().level, "debug");
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = AkfConfig::from_toml(
            r#"
[agent]
port = 1111

[capabilities.A]
command = "a"
"#,
        )
        .unwrap();
        let overlay = AkfConfig::from_toml(
            r#"
[agent]
port = 2222

[capabilities.B]
command = "b"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.agent().port, 2222);
        assert!(base.capabilities.contains_key("A"));
        assert!(base.capabilities.contains_key("B"));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let err = AkfConfig::from_toml(
            r#"
[capabilities.Broken]
command = "  "
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("capabilities.Broken.command"));
    }

    #[test]
    fn test_validate_rejects_zero_retry_interval() {
        let err = AkfConfig::from_toml("[client]\nretry_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
