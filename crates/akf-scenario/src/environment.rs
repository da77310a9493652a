//! The shared symbol table threaded through one scenario run.
//!
//! Keys are namespaced `"<ns>.<name>"`. In planning mode bindings are
//! symbolic names used in the generated script; in execution mode they are
//! live handles. Modules make their branching decisions on key presence
//! alone, so both modes take the same path through a scenario.

use std::fmt;
use std::sync::Arc;

use akf_client::CapabilityHandle;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Result, ScenarioError};

/// Key of the guest address provider.
pub const HYPERVISOR_KEY: &str = "akf.hypervisor";

/// Symbol used for the guest address provider in generated scripts.
pub const HYPERVISOR_SYMBOL: &str = "hypervisor";

/// Key of a persistent capability binding.
pub fn capability_key(capability: &str) -> String {
    format!("akf.capability.{}", capability)
}

/// Key under which collected records of `kind` are stored.
pub fn collected_key(kind: &str) -> String {
    format!("akf.collected.{}", kind)
}

/// Whether `key` has a non-empty namespace and name.
pub fn is_namespaced(key: &str) -> bool {
    key.split_once('.')
        .is_some_and(|(ns, name)| !ns.is_empty() && !name.is_empty() && !name.ends_with('.'))
}

/// Script variable name for a capability: `ArtifactService` -> `artifact_service`.
pub fn variable_name(capability: &str) -> String {
    let mut out = String::with_capacity(capability.len() + 4);
    for (i, ch) in capability.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out
}

/// The one thing the scenario engine needs from the hypervisor layer.
#[async_trait]
pub trait GuestAddress: Send + Sync {
    /// Network address of the running guest.
    async fn guest_address(&self) -> Result<String>;
}

/// A guest at a fixed address.
#[derive(Debug, Clone)]
pub struct StaticGuest {
    address: String,
}

impl StaticGuest {
    /// Guest reachable at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl GuestAddress for StaticGuest {
    async fn guest_address(&self) -> Result<String> {
        if self.address.is_empty() {
            return Err(ScenarioError::Guest("empty guest address".into()));
        }
        Ok(self.address.clone())
    }
}

/// A value held in the environment.
#[derive(Clone)]
pub enum Binding {
    /// A script variable name (planning mode).
    Symbol(String),
    /// Guest address provider (execution mode).
    Guest(Arc<dyn GuestAddress>),
    /// Open capability connection (execution mode).
    Capability(Arc<CapabilityHandle>),
    /// Plain data, such as collected records.
    Value(Value),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(s) => f.debug_tuple("Symbol").field(s).finish(),
            Self::Guest(_) => f.write_str("Guest(..)"),
            Self::Capability(h) => f.debug_tuple("Capability").field(&h.capability()).finish(),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// Ordered mapping of namespaced keys to bindings.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: IndexMap<String, Binding>,
}

impl Environment {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment for planning, with the hypervisor bound to `symbol`.
    pub fn for_plan(symbol: impl Into<String>) -> Self {
        let mut env = Self::new();
        env.bind(HYPERVISOR_KEY, Binding::Symbol(symbol.into()));
        env
    }

    /// Environment for execution against `guest`.
    pub fn for_run(guest: Arc<dyn GuestAddress>) -> Self {
        let mut env = Self::new();
        env.bind(HYPERVISOR_KEY, Binding::Guest(guest));
        env
    }

    /// Binding for `key`.
    pub fn get(&self, key: &str) -> Option<&Binding> {
        self.bindings.get(key)
    }

    /// Whether `key` is bound.
    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    /// Bind `key`, returning the previous binding.
    pub fn bind(&mut self, key: impl Into<String>, binding: Binding) -> Option<Binding> {
        self.bindings.insert(key.into(), binding)
    }

    /// Remove `key`, keeping the order of the remaining keys.
    pub fn unbind(&mut self, key: &str) -> Option<Binding> {
        self.bindings.shift_remove(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The text that refers to `key` in a generated script.
    pub fn symbol(&self, key: &str) -> Option<String> {
        let fallback = || key.rsplit('.').next().unwrap_or(key).to_string();
        self.bindings.get(key).map(|binding| match binding {
            Binding::Symbol(s) => s.clone(),
            Binding::Guest(_) => HYPERVISOR_SYMBOL.to_string(),
            Binding::Capability(h) => variable_name(h.capability()),
            Binding::Value(_) => fallback(),
        })
    }

    /// Script expression yielding the guest address.
    pub fn guest_expression(&self) -> Option<String> {
        self.symbol(HYPERVISOR_KEY)
            .map(|hv| format!("{}.guest_address()", hv))
    }

    /// Resolve the guest address through the bound provider.
    pub async fn guest_address(&self) -> Result<String> {
        match self.bindings.get(HYPERVISOR_KEY) {
            Some(Binding::Guest(guest)) => guest.guest_address().await,
            Some(_) => Err(ScenarioError::BindingMismatch {
                key: HYPERVISOR_KEY.to_string(),
                expected: "guest address provider",
            }),
            None => Err(ScenarioError::missing_prerequisite("environment", HYPERVISOR_KEY)),
        }
    }

    /// Open capability handle bound for `capability`.
    pub fn capability(&self, capability: &str) -> Result<Option<Arc<CapabilityHandle>>> {
        let key = capability_key(capability);
        match self.bindings.get(&key) {
            None => Ok(None),
            Some(Binding::Capability(handle)) => Ok(Some(Arc::clone(handle))),
            Some(_) => Err(ScenarioError::BindingMismatch {
                key,
                expected: "capability connection",
            }),
        }
    }
}
