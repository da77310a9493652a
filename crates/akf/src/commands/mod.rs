//! CLI command handlers.

use tokio_util::sync::CancellationToken;

pub mod agent;
pub mod capability;
pub mod modules;
pub mod plan;
pub mod run;
pub mod services;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: akf_config::AkfConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// A token cancelled on Ctrl+C.
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, shutting down");
                cancel.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "failed to listen for Ctrl+C"),
        }
    });
    token
}
