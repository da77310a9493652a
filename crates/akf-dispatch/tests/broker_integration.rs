//! Integration tests for the dispatch broker over real TCP connections.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use akf_dispatch::{
    ARTIFACT_SERVICE, CapabilityRegistry, DispatchBroker, InProcessLauncher, NameParams,
    PrefetchRecord, WorkerLauncher, codes, methods,
};
use akf_rpc::{RpcConnection, RpcError, RpcServer, RpcService};
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct Running {
    broker: Arc<DispatchBroker>,
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<akf_dispatch::Result<()>>,
}

async fn spawn_broker() -> Running {
    let launcher = Arc::new(InProcessLauncher::with_builtins()) as Arc<dyn WorkerLauncher>;
    let broker = Arc::new(DispatchBroker::new(CapabilityRegistry::builtin(), launcher));

    let server = RpcServer::bind(
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        Arc::clone(&broker) as Arc<dyn RpcService>,
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&broker).serve_on(server, shutdown.clone()));

    Running {
        broker,
        addr,
        shutdown,
        task,
    }
}

fn capability_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

#[tokio::test]
async fn test_start_connect_collect_stop() {
    let running = spawn_broker().await;
    let mut control = RpcConnection::connect(running.addr).await.unwrap();

    let available: Vec<String> = control
        .call_typed(methods::LIST_AVAILABLE, &())
        .await
        .unwrap();
    assert_eq!(available, vec![ARTIFACT_SERVICE]);

    let port: u16 = control
        .call_typed(methods::START, &NameParams::new(ARTIFACT_SERVICE))
        .await
        .unwrap();
    let again: u16 = control
        .call_typed(methods::START, &NameParams::new(ARTIFACT_SERVICE))
        .await
        .unwrap();
    assert_eq!(port, again);

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("CMD.EXE-0BD30981.pf"), b"MAM").unwrap();

    let mut capability = RpcConnection::connect(capability_addr(port)).await.unwrap();
    let records: Vec<PrefetchRecord> = capability
        .call_typed("collect_prefetch_dir", &json!({ "folder": dir.path() }))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].executable, "CMD.EXE");
    capability.close().await.unwrap();

    control
        .call(methods::STOP, Some(json!({ "name": ARTIFACT_SERVICE })))
        .await
        .unwrap();
    let running_now = control.call(methods::LIST_RUNNING, None).await.unwrap();
    assert_eq!(running_now, json!({}));

    running.shutdown.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_named_errors_cross_the_wire() {
    let running = spawn_broker().await;
    let mut control = RpcConnection::connect(running.addr).await.unwrap();

    let err = control
        .call(methods::START, Some(json!({ "name": "Chromium" })))
        .await
        .unwrap_err();
    assert_eq!(err.remote_code(), Some(codes::UNKNOWN_CAPABILITY));
    match err {
        RpcError::Remote { data, .. } => assert_eq!(data, Some(json!({ "capability": "Chromium" }))),
        other => panic!("unexpected error: {other}"),
    }

    let err = control
        .call(methods::STOP, Some(json!({ "name": ARTIFACT_SERVICE })))
        .await
        .unwrap_err();
    assert_eq!(err.remote_code(), Some(codes::NOT_RUNNING));

    running.shutdown.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_terminates_workers() {
    let running = spawn_broker().await;
    let port = running.broker.start(ARTIFACT_SERVICE).await.unwrap();
    assert!(RpcConnection::connect(capability_addr(port)).await.is_ok());

    running.shutdown.cancel();
    running.task.await.unwrap().unwrap();
    assert!(running.broker.list_running().is_empty());

    // The worker's listener is gone once the broker shuts down
    let reconnect = tokio::time::timeout(
        Duration::from_secs(2),
        RpcConnection::connect(capability_addr(port)),
    )
    .await
    .unwrap();
    assert!(reconnect.is_err());
}
