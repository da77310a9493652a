//! Error types for scenario planning and execution.

use thiserror::Error;

use crate::params::ParameterValidationError;
use crate::script::ScriptError;

/// Result type for scenario operations.
pub type Result<T> = std::result::Result<T, ScenarioError>;

/// Error type for scenario operations.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// No module is registered under this alias.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// Two modules claim the same alias.
    #[error("duplicate module alias: {0}")]
    DuplicateAlias(String),

    /// A module does not satisfy the module contract.
    #[error("invalid module {module}: {reason}")]
    InvalidModule {
        /// First alias of the module.
        module: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Step arguments failed validation.
    #[error("invalid arguments for {module}: {source}")]
    InvalidArgs {
        /// Module alias.
        module: String,
        /// Validation failure.
        source: ParameterValidationError,
    },

    /// A key the step requires is not in the environment.
    #[error("{module} requires `{key}` in the environment")]
    MissingPrerequisite {
        /// Module alias.
        module: String,
        /// Missing key.
        key: String,
    },

    /// A step added or removed a key it did not declare.
    #[error("{module} changed undeclared environment key `{key}`")]
    UndeclaredWrite {
        /// Module alias.
        module: String,
        /// Offending key.
        key: String,
    },

    /// A binding has the wrong shape for how it is used.
    #[error("binding `{key}` is not a {expected}")]
    BindingMismatch {
        /// Environment key.
        key: String,
        /// What the caller needed.
        expected: &'static str,
    },

    /// A step left the script's block structure unbalanced.
    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    /// A scenario step failed; the remaining steps were not run.
    #[error("step {index} ({module}) failed: {source}")]
    Step {
        /// Zero-based step index.
        index: usize,
        /// Module alias.
        module: String,
        /// The underlying failure.
        #[source]
        source: Box<ScenarioError>,
    },

    /// Capability handshake or call failed.
    #[error("capability error: {0}")]
    Client(#[from] akf_client::Error),

    /// The guest address could not be determined.
    #[error("guest address unavailable: {0}")]
    Guest(String),

    /// Scenario description could not be parsed.
    #[error("invalid scenario file: {0}")]
    Parse(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run aborted by the caller.
    #[error("scenario cancelled")]
    Cancelled,
}

impl ScenarioError {
    /// Create an argument validation error.
    pub fn invalid_args(module: impl Into<String>, source: ParameterValidationError) -> Self {
        Self::InvalidArgs {
            module: module.into(),
            source,
        }
    }

    /// Create a missing prerequisite error.
    pub fn missing_prerequisite(module: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingPrerequisite {
            module: module.into(),
            key: key.into(),
        }
    }

    /// The innermost error, looking through step wrappers.
    pub fn root(&self) -> &ScenarioError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Index of the failing step, if this error came from a step.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::Step { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for ScenarioError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
