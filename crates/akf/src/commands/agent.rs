//! Agent command - runs the dispatch broker inside the guest.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};

use akf_dispatch::{CapabilityKind, CapabilityRegistry, DispatchBroker, InProcessLauncher, ProcessLauncher, WorkerLauncher};

use super::{Context, ctrl_c_token};

/// Arguments for the agent command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct AgentArgs {
    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<IpAddr>,

    /// Broker port (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Serve built-in capabilities as tasks of this process instead of
    /// child processes
    #[arg(long)]
    pub in_process: bool,
}

/// Run the agent command.
pub async fn run(args: AgentArgs, ctx: &Context) -> Result<()> {
    let agent = ctx.config.agent();
    let bind = args.bind.unwrap_or(agent.bind);
    let addr = SocketAddr::new(bind, args.port.unwrap_or(agent.port));

    let capabilities = CapabilityRegistry::from_config(&ctx.config);
    let launcher: Arc<dyn WorkerLauncher> = if args.in_process {
        Arc::new(InProcessLauncher::with_builtins().with_bind(bind))
    } else {
        Arc::new(
            ProcessLauncher::current_exe()
                .context("failed to locate the akf executable")?
                .with_bind(bind)
                .with_launch_timeout(agent.launch_timeout()),
        )
    };

    if !ctx.json_output {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("AKF Agent").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {} {}", dim.apply_to("Listening:"), addr);
        for descriptor in capabilities.iter() {
            let kind = match descriptor.kind() {
                CapabilityKind::Builtin => "built-in",
                CapabilityKind::Command(_) => "command",
            };
            println!(
                "  {} {} {}",
                dim.apply_to("Capability:"),
                descriptor.name(),
                dim.apply_to(format!("({})", kind))
            );
        }
        println!();
    }

    let broker = Arc::new(DispatchBroker::new(capabilities, launcher));
    broker
        .serve(addr, ctrl_c_token())
        .await
        .with_context(|| format!("dispatch broker on {} failed", addr))?;

    tracing::info!("agent stopped");
    Ok(())
}
