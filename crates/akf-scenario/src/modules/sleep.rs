//! Fixed pauses between scenario steps.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::param;
use crate::context::RunContext;
use crate::environment::Environment;
use crate::error::Result;
use crate::module::{Invocation, Module};
use crate::params::{ParamExt, ParamResult, ParameterValidationError};
use crate::script::ScriptBuilder;

const ALIAS: &str = "sleep";

/// Pause the scenario.
pub struct Sleep;

fn seconds(args: &Value) -> ParamResult<u64> {
    match args.get("seconds").filter(|v| !v.is_null()) {
        None => Err(ParameterValidationError::Missing("seconds".into())),
        Some(_) => args.optional_u64("seconds", 0),
    }
}

#[async_trait]
impl Module for Sleep {
    fn aliases(&self) -> &[&'static str] {
        &[ALIAS, "wait"]
    }

    fn description(&self) -> &str {
        "Wait for a number of seconds"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"seconds": {"type": "integer", "minimum": 0}},
            "required": ["seconds"]
        })
    }

    fn dependencies(&self) -> &[&'static str] {
        &["time"]
    }

    fn validate(&self, args: &Value) -> ParamResult<()> {
        seconds(args).map(|_| ())
    }

    fn plan(&self, inv: &Invocation<'_>, _env: &mut Environment, script: &mut ScriptBuilder) -> Result<()> {
        let secs = param(ALIAS, seconds(inv.args))?;
        script.statement(format!("time.sleep({})", secs));
        Ok(())
    }

    async fn run(&self, inv: &Invocation<'_>, _env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
        let secs = param(ALIAS, seconds(inv.args))?;
        debug!(secs, "sleeping");
        ctx.sleep(Duration::from_secs(secs)).await
    }
}
