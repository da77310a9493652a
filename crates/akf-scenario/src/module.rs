//! The module contract and the alias registry.
//!
//! # Example
//!
//! ```rust,ignore
//! use akf_scenario::{Module, ModuleRegistry};
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl Module for Noop {
//!     fn aliases(&self) -> &[&'static str] { &["noop"] }
//!     fn description(&self) -> &str { "Does nothing" }
//!     fn parameters(&self) -> Value { json!({"type": "object", "properties": {}}) }
//!     fn plan(&self, _: &Invocation<'_>, _: &mut Environment, _: &mut ScriptBuilder) -> Result<()> { Ok(()) }
//!     async fn run(&self, _: &Invocation<'_>, _: &mut Environment, _: &mut RunContext) -> Result<()> { Ok(()) }
//! }
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(Noop)?;
//! let step = registry.step("noop", json!({}), json!({}))?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RunContext;
use crate::environment::{Environment, is_namespaced};
use crate::error::{Result, ScenarioError};
use crate::params::{ParamResult, check_known_arguments};
use crate::script::ScriptBuilder;

/// Arguments and configuration of one step, as seen by a module.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Validated step arguments.
    pub args: &'a Value,
    /// Step configuration.
    pub config: &'a Value,
}

/// A unit of scenario behavior with equivalent plan and run entry points.
///
/// `plan` and `run` must take the same branches for the same environment
/// keys, and `run` must perform exactly the [`Operation`](crate::Operation)s
/// that `plan` attaches to the nodes it emits.
#[async_trait]
pub trait Module: Send + Sync {
    /// Names this module is addressed by in scenario files. The first is
    /// its canonical name.
    fn aliases(&self) -> &[&'static str];

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema object of the accepted arguments.
    fn parameters(&self) -> Value;

    /// Environment keys consulted.
    fn reads(&self, _args: &Value) -> Vec<String> {
        Vec::new()
    }

    /// Environment keys that may be added or removed.
    fn writes(&self, _args: &Value) -> Vec<String> {
        Vec::new()
    }

    /// Keys that must be bound before the step runs.
    fn prerequisites(&self, _args: &Value) -> Vec<String> {
        Vec::new()
    }

    /// Imports the generated code needs.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    /// Check arguments beyond what the schema's property list expresses.
    fn validate(&self, _args: &Value) -> ParamResult<()> {
        Ok(())
    }

    /// Emit the script equivalent of this step.
    fn plan(&self, inv: &Invocation<'_>, env: &mut Environment, script: &mut ScriptBuilder) -> Result<()>;

    /// Perform this step.
    async fn run(&self, inv: &Invocation<'_>, env: &mut Environment, ctx: &mut RunContext) -> Result<()>;
}

/// Canonical name of a module.
pub fn module_name(module: &dyn Module) -> &'static str {
    module.aliases().first().copied().unwrap_or("<unnamed>")
}

fn check_keys(module: &str, keys: impl IntoIterator<Item = String>) -> Result<()> {
    for key in keys {
        if !is_namespaced(&key) {
            return Err(ScenarioError::InvalidModule {
                module: module.to_string(),
                reason: format!("environment key `{}` is not namespaced", key),
            });
        }
    }
    Ok(())
}

fn declared_keys(module: &dyn Module, args: &Value) -> Vec<String> {
    let mut keys = module.reads(args);
    keys.extend(module.writes(args));
    keys.extend(module.prerequisites(args));
    keys
}

/// A module bound to validated arguments. Immutable.
#[derive(Clone)]
pub struct ScenarioStep {
    module: Arc<dyn Module>,
    alias: String,
    args: Value,
    config: Value,
}

impl ScenarioStep {
    /// Alias the step was written with.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The module.
    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    /// Validated arguments.
    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Step configuration.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Invocation handed to the module.
    pub fn invocation(&self) -> Invocation<'_> {
        Invocation {
            args: &self.args,
            config: &self.config,
        }
    }

    /// Keys required before this step.
    pub fn prerequisites(&self) -> Vec<String> {
        self.module.prerequisites(&self.args)
    }

    /// Keys this step may add or remove.
    pub fn writes(&self) -> Vec<String> {
        self.module.writes(&self.args)
    }
}

impl std::fmt::Debug for ScenarioStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioStep")
            .field("alias", &self.alias)
            .field("args", &self.args)
            .field("config", &self.config)
            .finish()
    }
}

/// Registry of modules by alias.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
    by_alias: HashMap<&'static str, usize>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module after checking it against the module contract.
    pub fn register<M: Module + 'static>(&mut self, module: M) -> Result<()> {
        self.register_arc(Arc::new(module))
    }

    /// Register a module from an Arc.
    pub fn register_arc(&mut self, module: Arc<dyn Module>) -> Result<()> {
        let aliases = module.aliases();
        let Some(first) = aliases.first() else {
            return Err(ScenarioError::InvalidModule {
                module: "<unnamed>".into(),
                reason: "no aliases".into(),
            });
        };

        if aliases.iter().any(|a| a.trim().is_empty()) {
            return Err(ScenarioError::InvalidModule {
                module: first.to_string(),
                reason: "empty alias".into(),
            });
        }

        let schema = module.parameters();
        if schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(ScenarioError::InvalidModule {
                module: first.to_string(),
                reason: "parameter schema must be an object schema".into(),
            });
        }

        check_keys(first, declared_keys(module.as_ref(), &Value::Object(Default::default())))?;

        for &alias in aliases {
            if self.by_alias.contains_key(alias) {
                return Err(ScenarioError::DuplicateAlias(alias.to_string()));
            }
        }

        let index = self.modules.len();
        for &alias in aliases {
            self.by_alias.insert(alias, index);
        }
        tracing::debug!(module = %first, aliases = aliases.len(), "registered module");
        self.modules.push(module);
        Ok(())
    }

    /// Module registered under `alias`.
    pub fn get(&self, alias: &str) -> Option<Arc<dyn Module>> {
        self.by_alias
            .get(alias)
            .map(|&i| Arc::clone(&self.modules[i]))
    }

    /// Whether `alias` is registered.
    pub fn contains(&self, alias: &str) -> bool {
        self.by_alias.contains_key(alias)
    }

    /// Registered modules in registration order.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.modules.iter()
    }

    /// Number of modules (not aliases).
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolve `alias` and validate `args` into a step.
    ///
    /// Missing `args` or `config` (`null`) are treated as empty objects.
    pub fn step(&self, alias: &str, args: Value, config: Value) -> Result<ScenarioStep> {
        let module = self
            .get(alias)
            .ok_or_else(|| ScenarioError::UnknownModule(alias.to_string()))?;

        let args = if args.is_null() { Value::Object(Default::default()) } else { args };
        let config = if config.is_null() { Value::Object(Default::default()) } else { config };

        check_known_arguments(&module.parameters(), &args)
            .and_then(|()| module.validate(&args))
            .map_err(|e| ScenarioError::invalid_args(alias, e))?;
        check_keys(alias, declared_keys(module.as_ref(), &args))?;

        Ok(ScenarioStep {
            module,
            alias: alias.to_string(),
            args,
            config,
        })
    }
}
