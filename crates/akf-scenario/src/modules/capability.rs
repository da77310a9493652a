//! Generic capability lifecycle and call modules.

use akf_dispatch::ARTIFACT_SERVICE;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Acquired, CLIENT_IMPORT, guest_expression, param, plan_with_capability};
use crate::context::RunContext;
use crate::environment::{Binding, Environment, HYPERVISOR_KEY, capability_key, collected_key, variable_name};
use crate::error::Result;
use crate::module::{Invocation, Module};
use crate::modules::CHROMIUM;
use crate::params::{ParamExt, ParamResult, ParameterValidationError};
use crate::script::{Operation, ScriptBuilder, quote};

fn capability_arg(fixed: Option<&'static str>, args: &Value) -> ParamResult<String> {
    match fixed {
        Some(name) => Ok(name.to_string()),
        None => {
            let name = args.required_str("name")?;
            if name.trim().is_empty() {
                return Err(ParameterValidationError::invalid_value("name", "cannot be empty"));
            }
            Ok(name.to_string())
        }
    }
}

fn name_schema(fixed: Option<&'static str>, extra: Value) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    if fixed.is_none() {
        properties.insert(
            "name".into(),
            json!({"type": "string", "description": "Capability name known to the guest broker"}),
        );
        required.push("name");
    }
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    json!({"type": "object", "properties": properties, "required": required})
}

/// Start a capability and keep its connection in the environment.
pub struct CapabilityStart {
    aliases: &'static [&'static str],
    fixed: Option<&'static str>,
}

impl CapabilityStart {
    /// `capability_start`, naming the capability through `name`.
    pub fn generic() -> Self {
        Self {
            aliases: &["capability_start"],
            fixed: None,
        }
    }

    /// `chromium_service_start`.
    pub fn chromium() -> Self {
        Self {
            aliases: &["chromium_service_start"],
            fixed: Some(CHROMIUM),
        }
    }

    /// `artifact_service_start`.
    pub fn artifact_service() -> Self {
        Self {
            aliases: &["artifact_service_start"],
            fixed: Some(ARTIFACT_SERVICE),
        }
    }

    fn alias(&self) -> &'static str {
        self.aliases[0]
    }
}

#[async_trait]
impl Module for CapabilityStart {
    fn aliases(&self) -> &[&'static str] {
        self.aliases
    }

    fn description(&self) -> &str {
        "Start a capability on the guest and keep the connection for later steps"
    }

    fn parameters(&self) -> Value {
        name_schema(self.fixed, json!({}))
    }

    fn reads(&self, args: &Value) -> Vec<String> {
        capability_arg(self.fixed, args)
            .map(|c| vec![capability_key(&c)])
            .unwrap_or_default()
    }

    fn writes(&self, args: &Value) -> Vec<String> {
        self.reads(args)
    }

    fn prerequisites(&self, _args: &Value) -> Vec<String> {
        vec![HYPERVISOR_KEY.to_string()]
    }

    fn dependencies(&self) -> &[&'static str] {
        &[CLIENT_IMPORT]
    }

    fn validate(&self, args: &Value) -> ParamResult<()> {
        capability_arg(self.fixed, args).map(|_| ())
    }

    fn plan(&self, inv: &Invocation<'_>, env: &mut Environment, script: &mut ScriptBuilder) -> Result<()> {
        let capability = param(self.alias(), capability_arg(self.fixed, inv.args))?;
        let key = capability_key(&capability);
        if env.contains(&key) {
            warn!(capability = %capability, "capability already started, skipping");
            return Ok(());
        }

        let guest = guest_expression(self.alias(), env)?;
        let var = variable_name(&capability);
        script.statement_with(
            format!("let {} = connect({}, {})", var, guest, quote(&capability)),
            vec![Operation::start(&capability)],
        );
        env.bind(key, Binding::Symbol(var));
        Ok(())
    }

    async fn run(&self, inv: &Invocation<'_>, env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
        let capability = param(self.alias(), capability_arg(self.fixed, inv.args))?;
        let key = capability_key(&capability);
        if env.contains(&key) {
            warn!(capability = %capability, "capability already started, skipping");
            return Ok(());
        }

        let handle = ctx.acquire(env, &capability).await?;
        info!(capability = %capability, peer = %handle.peer_addr(), "capability started");
        env.bind(key, Binding::Capability(handle));
        Ok(())
    }
}

/// Release a capability started by [`CapabilityStart`].
pub struct CapabilityStop {
    aliases: &'static [&'static str],
    fixed: Option<&'static str>,
}

impl CapabilityStop {
    /// `capability_stop`, naming the capability through `name`.
    pub fn generic() -> Self {
        Self {
            aliases: &["capability_stop"],
            fixed: None,
        }
    }

    /// `chromium_service_stop`.
    pub fn chromium() -> Self {
        Self {
            aliases: &["chromium_service_stop"],
            fixed: Some(CHROMIUM),
        }
    }

    /// `artifact_service_stop`.
    pub fn artifact_service() -> Self {
        Self {
            aliases: &["artifact_service_stop"],
            fixed: Some(ARTIFACT_SERVICE),
        }
    }

    fn alias(&self) -> &'static str {
        self.aliases[0]
    }
}

#[async_trait]
impl Module for CapabilityStop {
    fn aliases(&self) -> &[&'static str] {
        self.aliases
    }

    fn description(&self) -> &str {
        "Close a persistent capability connection and stop the capability on the guest"
    }

    fn parameters(&self) -> Value {
        name_schema(
            self.fixed,
            json!({
                "release": {
                    "type": "boolean",
                    "description": "Ask the guest broker to stop the capability (default true)"
                }
            }),
        )
    }

    fn reads(&self, args: &Value) -> Vec<String> {
        capability_arg(self.fixed, args)
            .map(|c| vec![capability_key(&c)])
            .unwrap_or_default()
    }

    fn writes(&self, args: &Value) -> Vec<String> {
        self.reads(args)
    }

    fn dependencies(&self) -> &[&'static str] {
        &[CLIENT_IMPORT]
    }

    fn validate(&self, args: &Value) -> ParamResult<()> {
        capability_arg(self.fixed, args)?;
        args.optional_bool("release", true).map(|_| ())
    }

    fn plan(&self, inv: &Invocation<'_>, env: &mut Environment, script: &mut ScriptBuilder) -> Result<()> {
        let capability = param(self.alias(), capability_arg(self.fixed, inv.args))?;
        let release = param(self.alias(), inv.args.optional_bool("release", true))?;
        let key = capability_key(&capability);
        let Some(var) = env.symbol(&key) else {
            warn!(capability = %capability, "capability not started, skipping");
            return Ok(());
        };

        if release {
            script.statement_with(format!("release({})", var), vec![Operation::stop(&capability)]);
        } else {
            script.statement(format!("close({})", var));
        }
        env.unbind(&key);
        Ok(())
    }

    async fn run(&self, inv: &Invocation<'_>, env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
        let capability = param(self.alias(), capability_arg(self.fixed, inv.args))?;
        let release = param(self.alias(), inv.args.optional_bool("release", true))?;
        let Some(handle) = env.capability(&capability)? else {
            warn!(capability = %capability, "capability not started, skipping");
            return Ok(());
        };

        env.unbind(&capability_key(&capability));
        ctx.release(&handle, release).await?;
        info!(capability = %capability, release, "capability released");
        Ok(())
    }
}

/// Invoke one action on a capability.
pub struct CapabilityCall;

const CALL_ALIAS: &str = "capability_call";

struct CallArgs<'a> {
    capability: &'a str,
    action: &'a str,
    args: Value,
    store: Option<&'a str>,
}

fn call_args(args: &Value) -> ParamResult<CallArgs<'_>> {
    let store = args.optional_str("store")?;
    if let Some(store) = store
        && (store.is_empty() || store.contains('.'))
    {
        return Err(ParameterValidationError::invalid_value("store", "must be a plain name"));
    }
    Ok(CallArgs {
        capability: args.required_str("capability")?,
        action: args.required_str("action")?,
        args: args.optional_object("args")?,
        store,
    })
}

#[async_trait]
impl Module for CapabilityCall {
    fn aliases(&self) -> &[&'static str] {
        &[CALL_ALIAS]
    }

    fn description(&self) -> &str {
        "Invoke an action on a capability, connecting for this step if it is not already started"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "capability": {"type": "string", "description": "Capability name"},
                "action": {"type": "string", "description": "Method to invoke"},
                "args": {"type": "object", "description": "Method arguments"},
                "store": {"type": "string", "description": "Keep the result under akf.collected.<store>"}
            },
            "required": ["capability", "action"]
        })
    }

    fn reads(&self, args: &Value) -> Vec<String> {
        let mut keys = vec![HYPERVISOR_KEY.to_string()];
        if let Ok(capability) = args.required_str("capability") {
            keys.push(capability_key(capability));
        }
        keys
    }

    fn writes(&self, args: &Value) -> Vec<String> {
        match args.optional_str("store") {
            Ok(Some(store)) if !store.is_empty() => vec![collected_key(store)],
            _ => Vec::new(),
        }
    }

    fn dependencies(&self) -> &[&'static str] {
        &[CLIENT_IMPORT]
    }

    fn validate(&self, args: &Value) -> ParamResult<()> {
        call_args(args).map(|_| ())
    }

    fn plan(&self, inv: &Invocation<'_>, env: &mut Environment, script: &mut ScriptBuilder) -> Result<()> {
        let call = param(CALL_ALIAS, call_args(inv.args))?;
        plan_with_capability(CALL_ALIAS, call.capability, env, script, |var, script| {
            let expr = format!("{}.{}({})", var, call.action, call.args);
            let line = match call.store {
                Some(store) => format!("let {} = {}", store, expr),
                None => expr,
            };
            script.statement_with(line, vec![Operation::call(call.capability, call.action, call.args.clone())]);
            Ok(())
        })?;
        if let Some(store) = call.store {
            env.bind(collected_key(store), Binding::Symbol(store.to_string()));
        }
        Ok(())
    }

    async fn run(&self, inv: &Invocation<'_>, env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
        let call = param(CALL_ALIAS, call_args(inv.args))?;
        let acquired = Acquired::acquire(CALL_ALIAS, call.capability, env, ctx).await?;
        let outcome = ctx.invoke(acquired.handle(), call.action, call.args.clone()).await;
        let result = acquired.finish(outcome).await?;
        if let Some(store) = call.store {
            env.bind(collected_key(store), Binding::Value(result));
        }
        Ok(())
    }
}
