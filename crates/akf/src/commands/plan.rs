//! Plan command - renders a scenario as a replayable script.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use serde::Serialize;

use akf_scenario::{Environment, Operation, Scenario, ScenarioFile, builtin_registry};

use super::Context;

/// Arguments for the plan command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Scenario file (YAML or JSON)
    pub scenario: PathBuf,

    /// Write the script to this file instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Name of the hypervisor object in the generated script
    #[arg(long, default_value = "hypervisor")]
    pub hypervisor: String,
}

/// Plan output for JSON mode.
#[derive(Debug, Serialize)]
struct PlanOutput<'a> {
    name: &'a str,
    script: String,
    operations: Vec<Operation>,
}

/// Load and validate a scenario file against the built-in modules.
pub fn load_scenario(path: &std::path::Path) -> Result<Scenario> {
    let file = ScenarioFile::from_file(path)
        .with_context(|| format!("failed to load scenario {}", path.display()))?;
    let scenario = file
        .build(&builtin_registry())
        .with_context(|| format!("invalid scenario {}", path.display()))?;
    Ok(scenario)
}

/// Run the plan command.
pub async fn run(args: PlanArgs, ctx: &Context) -> Result<()> {
    let scenario = load_scenario(&args.scenario)?;
    let mut env = Environment::for_plan(args.hypervisor.as_str());
    let script = scenario
        .plan(&mut env)
        .with_context(|| format!("failed to plan scenario {}", scenario.name()))?;
    let text = script.render();

    if ctx.json_output {
        let output = PlanOutput {
            name: scenario.name(),
            script: text,
            operations: script.operations(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match &args.out {
        Some(path) => {
            std::fs::write(path, &text).with_context(|| format!("failed to write {}", path.display()))?;
            let dim = Style::new().dim();
            println!(
                "Wrote {} statements to {}",
                script.statement_count(),
                path.display()
            );
            if ctx.verbose {
                println!("  {} {}", dim.apply_to("Operations:"), script.operations().len());
            }
        }
        None => print!("{}", text),
    }
    Ok(())
}
