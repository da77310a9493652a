//! Scenario module engine for AKF.
//!
//! A scenario is an ordered list of steps, each naming a [`Module`] by alias
//! with validated arguments. The same scenario can be:
//!
//! - **planned** into a [`Script`] whose statements, replayed in order,
//!   perform the same capability operations, or
//! - **run** directly against a guest, with every capability operation
//!   recorded in an [`OperationTrace`].
//!
//! Modules make every decision from the [`Environment`] alone, so both
//! backends take the same branches and the planned operation sequence
//! equals the performed one.
//!
//! ```rust,ignore
//! use akf_scenario::{Environment, RunContext, ScenarioFile, StaticGuest, builtin_registry};
//!
//! let scenario = ScenarioFile::from_file(path)?.build(&builtin_registry())?;
//!
//! let script = scenario.plan(&mut Environment::for_plan("hypervisor"))?;
//! println!("{}", script);
//!
//! let mut env = Environment::for_run(Arc::new(StaticGuest::new("10.0.0.5")));
//! let mut ctx = RunContext::new(ConnectOptions::default());
//! scenario.run(&mut env, &mut ctx).await?;
//! ```

pub mod context;
pub mod engine;
pub mod environment;
pub mod error;
pub mod module;
pub mod modules;
pub mod params;
pub mod scenario;
pub mod script;

pub use context::{OperationTrace, RunContext};
pub use environment::{
    Binding, Environment, GuestAddress, HYPERVISOR_KEY, StaticGuest, capability_key, collected_key,
};
pub use error::{Result, ScenarioError};
pub use module::{Invocation, Module, ModuleRegistry, ScenarioStep, module_name};
pub use modules::builtin_registry;
pub use params::{ParamExt, ParamResult, ParameterValidationError};
pub use scenario::{Scenario, ScenarioFile, StepDefinition};
pub use script::{Node, Operation, Script, ScriptBuilder, ScriptError};
