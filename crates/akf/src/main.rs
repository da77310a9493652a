//! AKF - forensic scenario automation for virtual machine guests
//!
//! Main entry point for the AKF CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::Style;

mod commands;

use commands::{agent, capability, modules, plan, run, services};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// AKF - forensic scenario automation for virtual machine guests
#[derive(Parser)]
#[command(name = "akf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Load this config file instead of the discovered layers
    #[arg(long, global = true, env = "AKF_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the guest-side dispatch broker
    Agent(agent::AgentArgs),

    /// Serve one built-in capability (launched by the agent)
    #[command(hide = true)]
    Capability(capability::CapabilityArgs),

    /// Generate the script equivalent of a scenario
    Plan(plan::PlanArgs),

    /// Execute a scenario against a guest
    Run(run::RunArgs),

    /// Query or control capabilities on a guest
    Services(services::ServicesArgs),

    /// List the available scenario modules
    Modules(modules::ModulesArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve the effective config and the files it came from.
fn load_config(cli: &Cli) -> Result<(akf_config::AkfConfig, Vec<PathBuf>)> {
    if let Some(path) = &cli.config {
        return Ok((akf_config::load_config_file(path)?, vec![path.clone()]));
    }

    let loaded = akf_config::load_config(None)?;
    let yellow = Style::new().yellow();
    for warning in &loaded.warnings {
        eprintln!("{} {}", yellow.apply_to("warning:"), warning);
    }
    let sources = loaded.loaded_from().into_iter().map(PathBuf::from).collect();
    Ok((loaded.config, sources))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, sources) = load_config(&cli)?;
    config.validate()?;
    let logging = config.logging();

    // Console (human-readable, stderr) + rotating JSON file. Stdout is
    // reserved for command output and the capability port line.
    let filter = if cli.verbose {
        "akf=debug,akf_rpc=debug,akf_dispatch=debug,akf_client=debug,akf_scenario=debug,info".to_string()
    } else {
        let level = &logging.level;
        format!(
            "akf={level},akf_dispatch={level},akf_client={level},akf_scenario={level},warn"
        )
    };

    let file_layer = if logging.file {
        let log_dir = logging
            .directory
            .clone()
            .or_else(|| akf_config::user_config_dir().map(|d| d.join("logs")))
            .unwrap_or_else(|| PathBuf::from("logs"));
        let file_appender = tracing_appender::rolling::daily(&log_dir, "akf.log");
        Some(tracing_appender::non_blocking(file_appender))
    } else {
        None
    };
    let (writer, _guard) = match file_layer {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "akf=trace,akf_rpc=debug,akf_dispatch=trace,akf_client=trace,akf_scenario=trace,info",
                ))
        }))
        .init();

    for path in &sources {
        tracing::debug!(path = %path.display(), "loaded config layer");
    }

    let ctx = commands::Context {
        config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Agent(args) => agent::run(args, &ctx).await,
        Commands::Capability(args) => capability::run(args, &ctx).await,
        Commands::Plan(args) => plan::run(args, &ctx).await,
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Services(args) => services::run(args, &ctx).await,
        Commands::Modules(args) => modules::run(args, &ctx).await,
    }
}
