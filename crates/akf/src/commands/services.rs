//! Services command - talks to the dispatch broker on a guest.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use akf_client::{ConnectOptions, connect_broker};

use super::{Context, ctrl_c_token};

/// Arguments for the services command.
#[derive(Args, Debug)]
pub struct ServicesArgs {
    /// Guest network address
    #[arg(long, env = "AKF_GUEST")]
    pub host: String,

    /// Broker port on the guest (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<ServicesCommand>,
}

#[derive(Subcommand, Debug)]
pub enum ServicesCommand {
    /// List capabilities the guest can start (default)
    List,

    /// Show running capabilities and their ports
    Running,

    /// Start a capability
    Start {
        /// Capability name
        name: String,
    },

    /// Stop a running capability
    Stop {
        /// Capability name
        name: String,
    },
}

/// Run the services command.
pub async fn run(args: ServicesArgs, ctx: &Context) -> Result<()> {
    let mut options = ConnectOptions::from_config(&ctx.config.client())
        .with_wait_until_ready(false)
        .with_cancel(ctrl_c_token());
    if let Some(port) = args.port {
        options = options.with_broker_port(port);
    }

    let mut broker = connect_broker(&args.host, &options).await?;
    let dim = Style::new().dim();

    match args.command.unwrap_or(ServicesCommand::List) {
        ServicesCommand::List => {
            let names = broker.list_available().await?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }
        ServicesCommand::Running => {
            let running = broker.list_running().await?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&running)?);
            } else if running.is_empty() {
                println!("{}", dim.apply_to("No capabilities running"));
            } else {
                for (name, port) in running {
                    println!("{:<24} {}", name, port);
                }
            }
        }
        ServicesCommand::Start { name } => {
            let port = broker.start(&name).await?;
            if ctx.json_output {
                println!("{}", serde_json::json!({ "name": name, "port": port }));
            } else {
                println!("{} running on port {}", name, port);
            }
        }
        ServicesCommand::Stop { name } => {
            broker.stop(&name).await?;
            if !ctx.json_output {
                println!("{} stopped", name);
            }
        }
    }

    if let Err(e) = broker.close().await {
        tracing::debug!(error = %e, "failed to close broker connection");
    }
    Ok(())
}
