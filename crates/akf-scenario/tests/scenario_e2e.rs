//! Plan/run equivalence against an in-process guest.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use akf_client::ConnectOptions;
use akf_dispatch::{
    ARTIFACT_SERVICE, ArtifactService, CapabilityDescriptor, CapabilityRegistry, DispatchBroker, InProcessLauncher,
    WorkerLauncher,
};
use akf_rpc::{JsonRpcError, RpcServer, RpcService};
use akf_scenario::{
    Binding, Environment, Operation, RunContext, Scenario, ScenarioError, ScenarioFile, StaticGuest,
    builtin_registry,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Calls seen by the fake browser.
#[derive(Default)]
struct Calls(Mutex<Vec<(String, Value)>>);

impl Calls {
    fn push(&self, method: &str, params: Value) {
        self.0.lock().unwrap().push((method.to_string(), params));
    }

    fn methods(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }
}

struct FakeChromium {
    calls: Arc<Calls>,
}

#[async_trait]
impl RpcService for FakeChromium {
    fn name(&self) -> &str {
        "Chromium"
    }

    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "visit" | "kill_edge" | "set_browser" | "new_page" | "goto" => {
                self.calls.push(method, params.unwrap_or(Value::Null));
                Ok(Value::Null)
            }
            "get_history" => {
                let params = params.unwrap_or(Value::Null);
                self.calls.push(method, params.clone());
                Ok(json!([
                    {"url": "http://a.example", "title": "A", "visit_count": 2, "browser": params["browser"]},
                ]))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}

struct Guest {
    broker: Arc<DispatchBroker>,
    launcher: Arc<InProcessLauncher>,
    calls: Arc<Calls>,
    port: u16,
    shutdown: CancellationToken,
    _prefetch: tempfile::TempDir,
}

impl Drop for Guest {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Guest {
    fn env(&self) -> Environment {
        Environment::for_run(Arc::new(StaticGuest::new("127.0.0.1")))
    }

    fn ctx(&self) -> RunContext {
        RunContext::new(
            ConnectOptions::default()
                .with_broker_port(self.port)
                .with_deadline(Duration::from_secs(10)),
        )
    }
}

async fn guest() -> Guest {
    let prefetch = tempfile::tempdir().unwrap();
    std::fs::write(prefetch.path().join("CHROME.EXE-1A2B3C4D.pf"), b"MAM").unwrap();
    std::fs::write(prefetch.path().join("notes.txt"), b"x").unwrap();

    let calls = Arc::new(Calls::default());
    let launcher = Arc::new(
        InProcessLauncher::new()
            .with_service("Chromium", Arc::new(FakeChromium { calls: Arc::clone(&calls) }))
            .with_service(
                ARTIFACT_SERVICE,
                Arc::new(ArtifactService::new().with_prefetch_dir(prefetch.path())),
            ),
    );
    let capabilities = CapabilityRegistry::new()
        .with(CapabilityDescriptor::builtin("Chromium", "fake browser"))
        .with(CapabilityDescriptor::builtin(ARTIFACT_SERVICE, "artifacts"));
    let broker = Arc::new(DispatchBroker::new(
        capabilities,
        Arc::clone(&launcher) as Arc<dyn WorkerLauncher>,
    ));

    let server = RpcServer::bind(
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        Arc::clone(&broker) as Arc<dyn RpcService>,
    )
    .await
    .unwrap();
    let port = server.local_addr().unwrap().port();
    let shutdown = CancellationToken::new();
    tokio::spawn(Arc::clone(&broker).serve_on(server, shutdown.clone()));

    Guest {
        broker,
        launcher,
        calls,
        port,
        shutdown,
        _prefetch: prefetch,
    }
}

fn scenario(yaml: &str) -> Scenario {
    ScenarioFile::from_yaml(yaml).unwrap().build(&builtin_registry()).unwrap()
}

const START_VISIT_STOP: &str = r#"
name: start-visit-stop
steps:
  - module: capability_start
    args: {name: Chromium}
  - module: capability_call
    args:
      capability: Chromium
      action: visit
      args: {url: "http://example.com"}
  - module: capability_stop
    args: {name: Chromium}
"#;

#[tokio::test]
async fn test_start_visit_stop_plan_equals_run() {
    let guest = guest().await;
    let scenario = scenario(START_VISIT_STOP);

    let script = scenario.plan(&mut Environment::for_plan("hypervisor")).unwrap();
    assert_eq!(script.statement_count(), 3);
    assert!(!script.render().contains("with connect"));

    let mut env = guest.env();
    let mut ctx = guest.ctx();
    scenario.run(&mut env, &mut ctx).await.unwrap();

    let expected = vec![
        Operation::start("Chromium"),
        Operation::call("Chromium", "visit", json!({"url": "http://example.com"})),
        Operation::stop("Chromium"),
    ];
    assert_eq!(ctx.trace().operations(), expected.as_slice());
    assert_eq!(script.operations(), expected);

    assert_eq!(guest.calls.methods(), vec!["visit"]);
    assert!(guest.broker.list_running().is_empty());
    assert!(!env.contains("akf.capability.Chromium"));
}

#[tokio::test]
async fn test_scoped_call_without_binding() {
    let guest = guest().await;
    let scenario = scenario(
        r#"
name: scoped
steps:
  - module: capability_call
    args: {capability: Chromium, action: visit, args: {url: "http://example.com"}}
"#,
    );

    let script = scenario.plan(&mut Environment::for_plan("hypervisor")).unwrap();
    assert!(
        script
            .render()
            .contains("with connect(hypervisor.guest_address(), \"Chromium\") as chromium:\n    chromium.visit(")
    );

    let mut env = guest.env();
    let mut ctx = guest.ctx();
    scenario.run(&mut env, &mut ctx).await.unwrap();

    assert_eq!(ctx.trace().operations(), script.operations().as_slice());
    // Scoped acquisition never touches the environment or stops the capability
    assert_eq!(env.len(), 1);
    assert!(guest.broker.list_running().contains_key("Chromium"));
}

#[tokio::test]
async fn test_visit_urls_through_persistent_binding() {
    let guest = guest().await;
    let scenario = scenario(
        r#"
name: browse
steps:
  - module: chromium_service_start
  - module: chromium_visit_urls
    args: {urls: ["http://a.example", "http://b.example"], wait_time: 0}
  - module: chromium_service_stop
"#,
    );

    let script = scenario.plan(&mut Environment::for_plan("hypervisor")).unwrap();
    let mut env = guest.env();
    let mut ctx = guest.ctx();
    scenario.run(&mut env, &mut ctx).await.unwrap();

    assert_eq!(ctx.trace().operations(), script.operations().as_slice());
    assert_eq!(
        guest.calls.methods(),
        vec!["kill_edge", "set_browser", "new_page", "goto", "goto"]
    );
}

#[tokio::test]
async fn test_idempotent_start_launches_once() {
    let guest = guest().await;
    let scenario = scenario(
        r#"
name: twice
steps:
  - module: chromium_service_start
  - module: chromium_service_start
  - module: chromium_service_stop
  - module: chromium_service_stop
"#,
    );

    let script = scenario.plan(&mut Environment::for_plan("hypervisor")).unwrap();
    let mut env = guest.env();
    let mut ctx = guest.ctx();
    scenario.run(&mut env, &mut ctx).await.unwrap();

    assert_eq!(guest.launcher.launch_count("Chromium"), 1);
    assert_eq!(
        ctx.trace().operations(),
        &[Operation::start("Chromium"), Operation::stop("Chromium")]
    );
    assert_eq!(ctx.trace().operations(), script.operations().as_slice());
}

#[tokio::test]
async fn test_prefetch_collects_records() {
    let guest = guest().await;
    let scenario = scenario("name: pf\nsteps:\n  - module: prefetch\n");

    let script = scenario.plan(&mut Environment::for_plan("hypervisor")).unwrap();
    let mut env = guest.env();
    let mut ctx = guest.ctx();
    scenario.run(&mut env, &mut ctx).await.unwrap();
    assert_eq!(ctx.trace().operations(), script.operations().as_slice());

    let Some(Binding::Value(records)) = env.get("akf.collected.prefetch") else {
        panic!("prefetch records not bound");
    };
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["executable"], json!("CHROME.EXE"));
}

#[tokio::test]
async fn test_history_collected_into_environment() {
    let guest = guest().await;
    let scenario = scenario("name: hist\nsteps:\n  - module: chromium_get_history\n    args: {browser: chrome}\n");

    let script = scenario.plan(&mut Environment::for_plan("hypervisor")).unwrap();
    let mut env = guest.env();
    let mut ctx = guest.ctx();
    scenario.run(&mut env, &mut ctx).await.unwrap();
    assert_eq!(ctx.trace().operations(), script.operations().as_slice());

    let Some(Binding::Value(entries)) = env.get("akf.collected.history") else {
        panic!("history entries not bound");
    };
    assert_eq!(entries[0]["browser"], json!("chrome"));
    assert_eq!(guest.calls.methods(), vec!["get_history"]);
}

#[tokio::test]
async fn test_missing_hypervisor_aborts_before_any_operation() {
    let guest = guest().await;
    let scenario = scenario(START_VISIT_STOP);

    let mut env = Environment::new();
    let mut ctx = guest.ctx();
    let err = scenario.run(&mut env, &mut ctx).await.unwrap_err();

    assert_eq!(err.step_index(), Some(0));
    assert!(matches!(err.root(), ScenarioError::MissingPrerequisite { .. }));
    assert!(ctx.trace().is_empty());
    assert!(guest.broker.list_running().is_empty());
}

#[tokio::test]
async fn test_failure_leaves_completed_steps_in_place() {
    let guest = guest().await;
    let scenario = scenario(
        r#"
name: explode
steps:
  - module: chromium_service_start
  - module: capability_call
    args: {capability: Chromium, action: explode}
  - module: chromium_service_stop
"#,
    );

    let mut env = guest.env();
    let mut ctx = guest.ctx();
    let err = scenario.run(&mut env, &mut ctx).await.unwrap_err();

    assert_eq!(err.step_index(), Some(1));
    assert!(matches!(err.root(), ScenarioError::Client(_)));
    assert!(env.contains("akf.capability.Chromium"));
    assert!(guest.broker.list_running().contains_key("Chromium"));
}
