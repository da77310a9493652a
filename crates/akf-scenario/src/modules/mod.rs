//! Built-in scenario modules.
//!
//! Modules that need a capability for a single step go through
//! [`plan_with_capability`] and [`Acquired`], which share one rule: reuse
//! the persistent binding when the environment has one, otherwise open a
//! scoped connection around the step's body and close it afterwards.

mod capability;
mod chromium;
mod prefetch;
mod sleep;

use std::sync::Arc;

use akf_client::CapabilityHandle;
use tracing::warn;

pub use capability::{CapabilityCall, CapabilityStart, CapabilityStop};
pub use chromium::{CHROMIUM, ChromiumGetHistory, ChromiumVisitUrls};
pub use prefetch::Prefetch;
pub use sleep::Sleep;

use crate::context::RunContext;
use crate::environment::{Environment, HYPERVISOR_KEY, capability_key, variable_name};
use crate::error::{Result, ScenarioError};
use crate::module::ModuleRegistry;
use crate::params::ParamResult;
use crate::script::{Operation, ScriptBuilder, quote};

/// Import providing `connect`, `release` and `close` in generated scripts.
pub const CLIENT_IMPORT: &str = "akf.client";

/// Registry holding every built-in module.
pub fn builtin_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    let modules: Vec<Arc<dyn crate::Module>> = vec![
        Arc::new(CapabilityStart::generic()),
        Arc::new(CapabilityStart::chromium()),
        Arc::new(CapabilityStart::artifact_service()),
        Arc::new(CapabilityStop::generic()),
        Arc::new(CapabilityStop::chromium()),
        Arc::new(CapabilityStop::artifact_service()),
        Arc::new(CapabilityCall),
        Arc::new(ChromiumVisitUrls),
        Arc::new(ChromiumGetHistory),
        Arc::new(Prefetch),
        Arc::new(Sleep),
    ];
    for module in modules {
        if let Err(e) = registry.register_arc(module) {
            warn!(error = %e, "built-in module rejected");
        }
    }
    registry
}

/// Attach the module alias to an argument error.
pub(crate) fn param<T>(module: &str, result: ParamResult<T>) -> Result<T> {
    result.map_err(|e| ScenarioError::invalid_args(module, e))
}

/// Script expression for the hypervisor's guest address.
pub(crate) fn guest_expression(module: &str, env: &Environment) -> Result<String> {
    env.guest_expression()
        .ok_or_else(|| ScenarioError::missing_prerequisite(module, HYPERVISOR_KEY))
}

/// Emit `body` against `capability`, wrapping it in a scoped `with` block
/// unless a persistent binding exists.
pub(crate) fn plan_with_capability<F>(
    module: &str,
    capability: &str,
    env: &Environment,
    script: &mut ScriptBuilder,
    body: F,
) -> Result<()>
where
    F: FnOnce(&str, &mut ScriptBuilder) -> Result<()>,
{
    if let Some(var) = env.symbol(&capability_key(capability)) {
        return body(&var, script);
    }

    let guest = guest_expression(module, env)?;
    let var = variable_name(capability);
    script.open_block(
        format!("with connect({}, {}) as {}:", guest, quote(capability), var),
        vec![Operation::start(capability)],
    );
    body(&var, script)?;
    script.close_block()?;
    Ok(())
}

/// A capability connection obtained for one step.
pub(crate) struct Acquired {
    handle: Arc<CapabilityHandle>,
    scoped: bool,
}

impl Acquired {
    /// Reuse the persistent binding for `capability` or open a scoped one.
    pub(crate) async fn acquire(
        module: &str,
        capability: &str,
        env: &Environment,
        ctx: &mut RunContext,
    ) -> Result<Self> {
        if let Some(handle) = env.capability(capability)? {
            return Ok(Self {
                handle,
                scoped: false,
            });
        }
        if !env.contains(HYPERVISOR_KEY) {
            return Err(ScenarioError::missing_prerequisite(module, HYPERVISOR_KEY));
        }
        let handle = ctx.acquire(env, capability).await?;
        Ok(Self {
            handle,
            scoped: true,
        })
    }

    pub(crate) fn handle(&self) -> &CapabilityHandle {
        &self.handle
    }

    /// Close a scoped connection and return the body's outcome.
    pub(crate) async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        if self.scoped
            && let Err(e) = self.handle.close().await
        {
            if outcome.is_ok() {
                return Err(e.into());
            }
            warn!(capability = %self.handle.capability(), error = %e, "failed to close scoped connection");
        }
        outcome
    }
}
