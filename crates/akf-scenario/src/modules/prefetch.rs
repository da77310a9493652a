//! Prefetch collection through the artifact capability.

use akf_dispatch::ARTIFACT_SERVICE;
use akf_dispatch::artifacts::methods::COLLECT_PREFETCH_DIR;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{Acquired, CLIENT_IMPORT, param, plan_with_capability};
use crate::context::RunContext;
use crate::environment::{Binding, Environment, HYPERVISOR_KEY, capability_key, collected_key};
use crate::error::Result;
use crate::module::{Invocation, Module};
use crate::params::{ParamExt, ParamResult};
use crate::script::{Operation, ScriptBuilder};

const ALIAS: &str = "prefetch";
const KIND: &str = "prefetch";

/// Collect prefetch records from the guest.
pub struct Prefetch;

fn call_args(args: &Value) -> ParamResult<Value> {
    Ok(match args.optional_str("folder")? {
        Some(folder) => json!({"folder": folder}),
        None => json!({}),
    })
}

#[async_trait]
impl Module for Prefetch {
    fn aliases(&self) -> &[&'static str] {
        &[ALIAS]
    }

    fn description(&self) -> &str {
        "Collect prefetch file records from the guest"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "folder": {"type": "string", "description": "Prefetch directory on the guest"}
            }
        })
    }

    fn reads(&self, _args: &Value) -> Vec<String> {
        vec![HYPERVISOR_KEY.to_string(), capability_key(ARTIFACT_SERVICE)]
    }

    fn writes(&self, _args: &Value) -> Vec<String> {
        vec![collected_key(KIND)]
    }

    fn dependencies(&self) -> &[&'static str] {
        &[CLIENT_IMPORT]
    }

    fn validate(&self, args: &Value) -> ParamResult<()> {
        call_args(args).map(|_| ())
    }

    fn plan(&self, inv: &Invocation<'_>, env: &mut Environment, script: &mut ScriptBuilder) -> Result<()> {
        let args = param(ALIAS, call_args(inv.args))?;
        plan_with_capability(ALIAS, ARTIFACT_SERVICE, env, script, |var, script| {
            script.statement_with(
                format!("let {} = {}.{}({})", KIND, var, COLLECT_PREFETCH_DIR, args),
                vec![Operation::call(ARTIFACT_SERVICE, COLLECT_PREFETCH_DIR, args.clone())],
            );
            Ok(())
        })?;
        env.bind(collected_key(KIND), Binding::Symbol(KIND.to_string()));
        Ok(())
    }

    async fn run(&self, inv: &Invocation<'_>, env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
        let args = param(ALIAS, call_args(inv.args))?;
        let acquired = Acquired::acquire(ALIAS, ARTIFACT_SERVICE, env, ctx).await?;
        let outcome = ctx.invoke(acquired.handle(), COLLECT_PREFETCH_DIR, args).await;
        let records = acquired.finish(outcome).await?;

        let count = records.as_array().map_or(0, Vec::len);
        info!(count, "collected prefetch records");
        env.bind(collected_key(KIND), Binding::Value(records));
        Ok(())
    }
}
