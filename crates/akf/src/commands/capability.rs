//! Capability command - serves one built-in capability as a worker process.
//!
//! The agent launches this as `akf capability <Name> --bind <addr>` and reads
//! the announced port from the first line of stdout.

use std::net::{IpAddr, Ipv4Addr};

use anyhow::{Result, anyhow};
use clap::Args;

use akf_dispatch::{builtin_service, serve_capability};

use super::{Context, ctrl_c_token};

/// Arguments for the capability command.
#[derive(Args, Debug)]
pub struct CapabilityArgs {
    /// Built-in capability name
    pub name: String,

    /// Address to bind to
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,
}

/// Run the capability command.
pub async fn run(args: CapabilityArgs, _ctx: &Context) -> Result<()> {
    let service =
        builtin_service(&args.name).ok_or_else(|| anyhow!("unknown built-in capability: {}", args.name))?;

    tracing::debug!(capability = %args.name, bind = %args.bind, "serving capability");
    serve_capability(service, args.bind, ctrl_c_token()).await?;
    Ok(())
}
