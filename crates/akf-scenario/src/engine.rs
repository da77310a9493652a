//! Planning and execution backends.
//!
//! Both backends walk the steps in order and apply the same checks around
//! each one: declared prerequisites must be bound before the step, and the
//! step may only add or remove the keys it declares as writes. A failing
//! step aborts the walk; the environment keeps whatever the completed steps
//! left in it.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::context::RunContext;
use crate::environment::Environment;
use crate::error::{Result, ScenarioError};
use crate::module::ScenarioStep;
use crate::script::{Script, ScriptBuilder, ScriptError};

fn check_prerequisites(step: &ScenarioStep, env: &Environment) -> Result<()> {
    for key in step.prerequisites() {
        if !env.contains(&key) {
            return Err(ScenarioError::missing_prerequisite(step.alias(), key));
        }
    }
    Ok(())
}

fn snapshot(env: &Environment) -> BTreeSet<String> {
    env.keys().map(str::to_string).collect()
}

fn check_writes(step: &ScenarioStep, before: &BTreeSet<String>, env: &Environment) -> Result<()> {
    let after = snapshot(env);
    let declared = step.writes();
    if let Some(key) = before
        .symmetric_difference(&after)
        .find(|key| !declared.iter().any(|d| d == *key))
    {
        return Err(ScenarioError::UndeclaredWrite {
            module: step.alias().to_string(),
            key: key.clone(),
        });
    }
    Ok(())
}

fn wrap(index: usize, step: &ScenarioStep, err: ScenarioError) -> ScenarioError {
    ScenarioError::Step {
        index,
        module: step.alias().to_string(),
        source: Box::new(err),
    }
}

fn plan_step(step: &ScenarioStep, env: &mut Environment) -> Result<Script> {
    check_prerequisites(step, env)?;
    let before = snapshot(env);

    let mut fragment = ScriptBuilder::new();
    for dependency in step.module().dependencies() {
        fragment.import(*dependency);
    }
    step.module().plan(&step.invocation(), env, &mut fragment)?;
    if fragment.depth() != 0 {
        return Err(ScriptError::DepthChanged {
            before: 0,
            after: fragment.depth(),
        }
        .into());
    }

    check_writes(step, &before, env)?;
    Ok(fragment.finish()?)
}

/// Plan `steps` against `env`, producing one script.
///
/// Each step's fragment is merged at the top level; fragments that emit
/// lines are separated by a blank line.
pub fn plan(steps: &[ScenarioStep], env: &mut Environment) -> Result<Script> {
    let mut script = ScriptBuilder::new();
    for (index, step) in steps.iter().enumerate() {
        debug!(step = index, module = %step.alias(), "planning step");
        let fragment = plan_step(step, env).map_err(|e| wrap(index, step, e))?;
        if !fragment.nodes().is_empty() && !script.is_empty() {
            script.blank();
        }
        script.append(fragment);
    }
    Ok(script.finish()?)
}

async fn run_step(step: &ScenarioStep, env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(ScenarioError::Cancelled);
    }
    check_prerequisites(step, env)?;
    let before = snapshot(env);
    step.module().run(&step.invocation(), env, ctx).await?;
    check_writes(step, &before, env)
}

/// Execute `steps` against `env`, recording operations into `ctx`.
pub async fn run(steps: &[ScenarioStep], env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
    for (index, step) in steps.iter().enumerate() {
        info!(step = index, module = %step.alias(), "running step");
        run_step(step, env, ctx)
            .await
            .map_err(|e| wrap(index, step, e))?;
    }
    Ok(())
}
