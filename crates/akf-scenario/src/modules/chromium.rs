//! Browser automation through the Chromium capability.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{Acquired, CLIENT_IMPORT, param, plan_with_capability};
use crate::context::RunContext;
use crate::environment::{Binding, Environment, HYPERVISOR_KEY, capability_key, collected_key};
use crate::error::{Result, ScenarioError};
use crate::module::{Invocation, Module};
use crate::params::{ParamExt, ParamResult, ParameterValidationError};
use crate::script::{Operation, ScriptBuilder, quote};

/// Capability name of the guest browser driver.
pub const CHROMIUM: &str = "Chromium";

const ALIAS: &str = "chromium_visit_urls";
const HISTORY_ALIAS: &str = "chromium_get_history";
const HISTORY_KIND: &str = "history";
const GET_HISTORY: &str = "get_history";
const BROWSERS: &[&str] = &["msedge", "chrome"];
const DEFAULT_BROWSER: &str = "msedge";
const DEFAULT_WAIT_SECS: u64 = 5;
/// Upper bound for `wait_time` and `jitter`.
const MAX_WAIT_SECS: u64 = u32::MAX as u64;

/// Visit a list of URLs in a fresh browser page.
pub struct ChromiumVisitUrls;

#[derive(Debug)]
enum UrlSource<'a> {
    Inline(Vec<String>),
    File(&'a str),
}

#[derive(Debug)]
struct VisitArgs<'a> {
    browser: &'a str,
    source: UrlSource<'a>,
    wait_time: u64,
    jitter: u64,
}

fn browser_arg(args: &Value) -> ParamResult<&str> {
    let browser = args.optional_str("browser")?.unwrap_or(DEFAULT_BROWSER);
    if !BROWSERS.contains(&browser) {
        return Err(ParameterValidationError::invalid_value(
            "browser",
            format!("must be one of {}", BROWSERS.join(", ")),
        ));
    }
    Ok(browser)
}

fn seconds_arg(args: &Value, name: &str, default: u64) -> ParamResult<u64> {
    let secs = args.optional_u64(name, default)?;
    if secs > MAX_WAIT_SECS {
        return Err(ParameterValidationError::invalid_value(
            name,
            format!("cannot exceed {} seconds", MAX_WAIT_SECS),
        ));
    }
    Ok(secs)
}

fn visit_args(args: &Value) -> ParamResult<VisitArgs<'_>> {
    let browser = browser_arg(args)?;

    let urls = args.optional_str_list("urls")?;
    let file = args.optional_str("file")?;
    let source = match (args.get("urls").filter(|v| !v.is_null()), file) {
        (Some(_), Some(_)) => {
            return Err(ParameterValidationError::Conflict(
                "only one of 'urls' and 'file' may be given".into(),
            ));
        }
        (None, None) => return Err(ParameterValidationError::Missing("urls or file".into())),
        (Some(_), None) if urls.is_empty() => {
            return Err(ParameterValidationError::invalid_value("urls", "cannot be empty"));
        }
        (Some(_), None) => UrlSource::Inline(urls),
        (None, Some(file)) => UrlSource::File(file),
    };

    let wait_time = seconds_arg(args, "wait_time", DEFAULT_WAIT_SECS)?;
    let jitter = seconds_arg(args, "jitter", 0)?;

    Ok(VisitArgs {
        browser,
        source,
        wait_time,
        jitter,
    })
}

/// One URL per line; blank lines and `#` comments are skipped. A file with
/// no URLs left is rejected.
fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    let urls: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        return Err(ScenarioError::invalid_args(
            ALIAS,
            ParameterValidationError::invalid_value("file", format!("{} contains no URLs", path.display())),
        ));
    }
    Ok(urls)
}

impl VisitArgs<'_> {
    fn urls(&self) -> Result<Vec<String>> {
        match &self.source {
            UrlSource::Inline(urls) => Ok(urls.clone()),
            UrlSource::File(path) => read_url_file(Path::new(path)),
        }
    }

    /// Calls made before the first visit.
    fn setup_calls(&self) -> Vec<(&'static str, Value)> {
        let mut calls = Vec::new();
        if self.browser == "msedge" {
            calls.push(("kill_edge", json!({})));
        }
        calls.push(("set_browser", json!({"browser": self.browser})));
        calls.push(("new_page", json!({})));
        calls
    }

    /// Script form of [`Self::pause`]; both clamp to at least one second.
    fn sleep_expression(&self) -> String {
        if self.jitter == 0 {
            format!("time.sleep({})", self.wait_time.max(1))
        } else {
            format!(
                "time.sleep(max(1, {} + random.randint(-{}, {})))",
                self.wait_time, self.jitter, self.jitter
            )
        }
    }

    fn pause(&self) -> Duration {
        let jitter = i64::try_from(self.jitter).unwrap_or(i64::MAX);
        let offset = if jitter == 0 {
            0
        } else {
            rand::rng().random_range(-jitter..=jitter)
        };
        Duration::from_secs(self.wait_time.saturating_add_signed(offset).max(1))
    }
}

fn goto(url: &str) -> Operation {
    Operation::call(CHROMIUM, "goto", json!({"url": url}))
}

#[async_trait]
impl Module for ChromiumVisitUrls {
    fn aliases(&self) -> &[&'static str] {
        &[ALIAS]
    }

    fn description(&self) -> &str {
        "Open a browser page and visit each URL, pausing between visits"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "browser": {"type": "string", "enum": BROWSERS, "default": DEFAULT_BROWSER},
                "urls": {"type": "array", "items": {"type": "string"}},
                "file": {"type": "string", "description": "Text file with one URL per line"},
                "wait_time": {"type": "integer", "minimum": 0, "maximum": MAX_WAIT_SECS, "default": DEFAULT_WAIT_SECS},
                "jitter": {"type": "integer", "minimum": 0, "maximum": MAX_WAIT_SECS, "default": 0}
            }
        })
    }

    fn reads(&self, _args: &Value) -> Vec<String> {
        vec![HYPERVISOR_KEY.to_string(), capability_key(CHROMIUM)]
    }

    fn dependencies(&self) -> &[&'static str] {
        &[CLIENT_IMPORT, "random", "time"]
    }

    fn validate(&self, args: &Value) -> ParamResult<()> {
        visit_args(args).map(|_| ())
    }

    fn plan(&self, inv: &Invocation<'_>, env: &mut Environment, script: &mut ScriptBuilder) -> Result<()> {
        let visit = param(ALIAS, visit_args(inv.args))?;
        let urls = visit.urls()?;

        plan_with_capability(ALIAS, CHROMIUM, env, script, |var, script| {
            for (method, args) in visit.setup_calls() {
                let text = if method == "set_browser" {
                    format!("{}.{}({})", var, method, quote(visit.browser))
                } else {
                    format!("{}.{}()", var, method)
                };
                script.statement_with(text, vec![Operation::call(CHROMIUM, method, args)]);
            }

            let list = Value::from(urls.clone()).to_string();
            script.open_block(format!("for url in {}:", list), Vec::new());
            script.statement_with(
                format!("{}.goto(url)", var),
                urls.iter().map(String::as_str).map(goto).collect(),
            );
            script.statement(visit.sleep_expression());
            script.close_block()?;
            Ok(())
        })
    }

    async fn run(&self, inv: &Invocation<'_>, env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
        let visit = param(ALIAS, visit_args(inv.args))?;
        let urls = visit.urls()?;

        let acquired = Acquired::acquire(ALIAS, CHROMIUM, env, ctx).await?;
        let outcome = visit_all(&visit, &urls, &acquired, ctx).await;
        acquired.finish(outcome).await
    }
}

async fn visit_all(visit: &VisitArgs<'_>, urls: &[String], acquired: &Acquired, ctx: &mut RunContext) -> Result<()> {
    let handle = acquired.handle();
    for (method, args) in visit.setup_calls() {
        ctx.invoke(handle, method, args).await?;
    }

    for url in urls {
        ctx.invoke(handle, "goto", json!({"url": url})).await?;
        let pause = visit.pause();
        debug!(url = %url, pause_secs = pause.as_secs(), "visited");
        ctx.sleep(pause).await?;
    }
    info!(count = urls.len(), browser = visit.browser, "finished visiting urls");
    Ok(())
}

/// Collect the browser's URL history from the guest.
pub struct ChromiumGetHistory;

fn history_args(args: &Value) -> ParamResult<Value> {
    let browser = browser_arg(args)?;
    Ok(match args.optional_str("history_path")? {
        Some(path) => json!({"browser": browser, "history_path": path}),
        None => json!({"browser": browser}),
    })
}

#[async_trait]
impl Module for ChromiumGetHistory {
    fn aliases(&self) -> &[&'static str] {
        &[HISTORY_ALIAS]
    }

    fn description(&self) -> &str {
        "Collect URL history entries from the guest browser profile"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "browser": {"type": "string", "enum": BROWSERS, "default": DEFAULT_BROWSER},
                "history_path": {
                    "type": "string",
                    "description": "History database on the guest; defaults to the browser's profile"
                }
            }
        })
    }

    fn reads(&self, _args: &Value) -> Vec<String> {
        vec![HYPERVISOR_KEY.to_string(), capability_key(CHROMIUM)]
    }

    fn writes(&self, _args: &Value) -> Vec<String> {
        vec![collected_key(HISTORY_KIND)]
    }

    fn dependencies(&self) -> &[&'static str] {
        &[CLIENT_IMPORT]
    }

    fn validate(&self, args: &Value) -> ParamResult<()> {
        history_args(args).map(|_| ())
    }

    fn plan(&self, inv: &Invocation<'_>, env: &mut Environment, script: &mut ScriptBuilder) -> Result<()> {
        let args = param(HISTORY_ALIAS, history_args(inv.args))?;
        plan_with_capability(HISTORY_ALIAS, CHROMIUM, env, script, |var, script| {
            script.statement_with(
                format!("let {} = {}.{}({})", HISTORY_KIND, var, GET_HISTORY, args),
                vec![Operation::call(CHROMIUM, GET_HISTORY, args.clone())],
            );
            Ok(())
        })?;
        env.bind(collected_key(HISTORY_KIND), Binding::Symbol(HISTORY_KIND.to_string()));
        Ok(())
    }

    async fn run(&self, inv: &Invocation<'_>, env: &mut Environment, ctx: &mut RunContext) -> Result<()> {
        let args = param(HISTORY_ALIAS, history_args(inv.args))?;
        let acquired = Acquired::acquire(HISTORY_ALIAS, CHROMIUM, env, ctx).await?;
        let outcome = ctx.invoke(acquired.handle(), GET_HISTORY, args).await;
        let entries = acquired.finish(outcome).await?;

        let count = entries.as_array().map_or(0, Vec::len);
        info!(count, "collected browser history");
        env.bind(collected_key(HISTORY_KIND), Binding::Value(entries));
        Ok(())
    }
}
