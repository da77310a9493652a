//! Modules command - lists scenario modules and their arguments.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use serde_json::Value;

use akf_scenario::{builtin_registry, module_name};

use super::Context;

/// Arguments for the modules command.
#[derive(Args, Debug)]
pub struct ModulesArgs {
    /// Show the argument schema of each module
    #[arg(short, long)]
    pub detailed: bool,
}

#[derive(Debug, Serialize)]
struct ModuleOutput {
    aliases: Vec<&'static str>,
    description: String,
    parameters: Value,
}

/// Run the modules command.
pub async fn run(args: ModulesArgs, ctx: &Context) -> Result<()> {
    let registry = builtin_registry();

    if ctx.json_output {
        let output: Vec<_> = registry
            .modules()
            .map(|m| ModuleOutput {
                aliases: m.aliases().to_vec(),
                description: m.description().to_string(),
                parameters: m.parameters(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    for module in registry.modules() {
        println!("{}", style(module_name(module.as_ref())).bold());
        if let Some(others) = module.aliases().get(1..)
            && !others.is_empty()
        {
            println!("  {} {}", dim.apply_to("Aliases:"), others.join(", "));
        }
        println!("  {}", module.description());

        let schema = module.parameters();
        let params: Vec<&str> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default();
        if !params.is_empty() {
            println!("  {} {}", dim.apply_to("Arguments:"), params.join(", "));
        }
        if args.detailed {
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        println!();
    }
    Ok(())
}
