//! Scenario description files.
//!
//! # Example YAML
//!
//! ```yaml
//! name: browse
//! description: Visit a page and collect prefetch records
//! steps:
//!   - module: chromium_service_start
//!   - module: chromium_visit_urls
//!     args:
//!       urls: ["http://example.com"]
//!       wait_time: 5
//!   - module: chromium_service_stop
//!   - module: prefetch
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RunContext;
use crate::engine;
use crate::environment::Environment;
use crate::error::{Result, ScenarioError};
use crate::module::{ModuleRegistry, ScenarioStep};
use crate::script::Script;

/// A scenario as written on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioFile {
    /// Scenario name.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Ordered steps.
    pub steps: Vec<StepDefinition>,
}

/// One step as written on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepDefinition {
    /// Module alias.
    pub module: String,

    /// Module arguments.
    #[serde(default)]
    pub args: Value,

    /// Step configuration.
    #[serde(default)]
    pub config: Value,
}

impl ScenarioFile {
    /// Parse from YAML. JSON is accepted as well, being a YAML subset.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(text)?;
        if file.name.trim().is_empty() {
            return Err(ScenarioError::Parse("scenario name cannot be empty".into()));
        }
        Ok(file)
    }

    /// Read and parse a scenario file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text).map_err(|e| match e {
            ScenarioError::Parse(msg) => ScenarioError::Parse(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Resolve every step against `registry`.
    pub fn build(&self, registry: &ModuleRegistry) -> Result<Scenario> {
        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, def)| {
                registry
                    .step(&def.module, def.args.clone(), def.config.clone())
                    .map_err(|e| ScenarioError::Step {
                        index,
                        module: def.module.clone(),
                        source: Box::new(e),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Scenario {
            name: self.name.clone(),
            description: self.description.clone(),
            steps,
        })
    }
}

/// An ordered list of validated steps.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    description: String,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Scenario from already-validated steps.
    pub fn new(name: impl Into<String>, steps: Vec<ScenarioStep>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps,
        }
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Steps in order.
    pub fn steps(&self) -> &[ScenarioStep] {
        &self.steps
    }

    /// Produce the equivalent script.
    pub fn plan(&self, env: &mut Environment) -> Result<Script> {
        engine::plan(&self.steps, env)
    }

    /// Execute against a guest.
    pub async fn run(&self, env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
        engine::run(&self.steps, env, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::builtin_registry;
    use serde_json::json;

    const YAML: &str = r#"
name: browse
steps:
  - module: chromium_service_start
  - module: chromium_visit_urls
    args:
      urls: ["http://example.com"]
      wait_time: 2
  - module: chromium_service_stop
"#;

    #[test]
    fn test_parse_and_build() {
        let file = ScenarioFile::from_yaml(YAML).unwrap();
        assert_eq!(file.steps.len(), 3);
        assert!(file.steps[0].args.is_null());
        assert_eq!(file.steps[1].args["wait_time"], json!(2));

        let scenario = file.build(&builtin_registry()).unwrap();
        assert_eq!(scenario.name(), "browse");
        assert_eq!(scenario.steps()[1].alias(), "chromium_visit_urls");
    }

    #[test]
    fn test_build_reports_failing_step() {
        let file = ScenarioFile::from_yaml(
            "name: bad\nsteps:\n  - module: sleep\n    args: {seconds: 1}\n  - module: teleport\n",
        )
        .unwrap();
        let err = file.build(&builtin_registry()).unwrap_err();
        assert_eq!(err.step_index(), Some(1));
        assert!(matches!(err.root(), ScenarioError::UnknownModule(m) if m == "teleport"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(ScenarioFile::from_yaml("name: [\n"), Err(ScenarioError::Parse(_))));
        assert!(matches!(
            ScenarioFile::from_yaml("name: \"\"\nsteps: []\n"),
            Err(ScenarioError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        std::fs::write(&path, r#"{"name": "j", "steps": [{"module": "sleep", "args": {"seconds": 0}}]}"#).unwrap();
        let file = ScenarioFile::from_file(&path).unwrap();
        assert_eq!(file.name, "j");
        assert!(ScenarioFile::from_file(&dir.path().join("missing.yaml")).is_err());
    }
}
