//! Run command - executes a scenario against a guest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use akf_client::ConnectOptions;
use akf_scenario::{Environment, Operation, RunContext, StaticGuest};

use super::plan::load_scenario;
use super::{Context, ctrl_c_token};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario file (YAML or JSON)
    pub scenario: PathBuf,

    /// Guest network address
    #[arg(long, env = "AKF_GUEST")]
    pub guest: String,

    /// Broker port on the guest (overrides config)
    #[arg(long)]
    pub broker_port: Option<u16>,

    /// Give up connecting after this many seconds (overrides config)
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Fail immediately if the broker is unreachable
    #[arg(long)]
    pub no_wait: bool,
}

/// Run output for JSON mode.
#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    name: &'a str,
    success: bool,
    error: Option<String>,
    operations: &'a [Operation],
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let scenario = load_scenario(&args.scenario)?;

    let mut options = ConnectOptions::from_config(&ctx.config.client()).with_cancel(ctrl_c_token());
    if let Some(port) = args.broker_port {
        options = options.with_broker_port(port);
    }
    if let Some(secs) = args.deadline {
        options = options.with_deadline(Duration::from_secs(secs));
    }
    if args.no_wait {
        options = options.with_wait_until_ready(false);
    }

    let mut env = Environment::for_run(Arc::new(StaticGuest::new(args.guest.as_str())));
    let mut run_ctx = RunContext::new(options);
    let result = scenario.run(&mut env, &mut run_ctx).await;
    let trace = run_ctx.into_trace();

    if ctx.json_output {
        let output = RunOutput {
            name: scenario.name(),
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            operations: trace.operations(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let dim = Style::new().dim();
        println!();
        println!("{} {}", style("Scenario").bold(), scenario.name());
        println!("{}", dim.apply_to("─".repeat(40)));
        for op in trace.operations() {
            println!("  {}", op);
        }
        if trace.is_empty() {
            println!("  {}", dim.apply_to("(no capability operations)"));
        }
        println!();
        if result.is_ok() {
            println!("{}", Style::new().green().apply_to("● completed"));
            if ctx.verbose {
                println!("  {} {}", dim.apply_to("Bindings:"), env.keys().collect::<Vec<_>>().join(", "));
            }
        }
    }

    result.map_err(|e| anyhow::Error::new(e).context(format!("scenario {} failed", scenario.name())))
}
