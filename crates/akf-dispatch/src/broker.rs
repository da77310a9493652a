//! The dispatch broker: start, stop and locate capability workers.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use akf_rpc::{JsonRpcError, RpcServer, RpcService, parse_params};
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::capability::CapabilityRegistry;
use crate::error::{DispatchError, Result};
use crate::launcher::WorkerLauncher;
use crate::protocol::{NameParams, methods};
use crate::registry::{Lookup, Registry, SubserviceRecord};

/// Single authority inside the guest for which capabilities run where.
pub struct DispatchBroker {
    capabilities: CapabilityRegistry,
    registry: Registry,
    launcher: Arc<dyn WorkerLauncher>,
}

impl DispatchBroker {
    /// Create a broker over a fixed capability set.
    pub fn new(capabilities: CapabilityRegistry, launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self {
            capabilities,
            registry: Registry::new(),
            launcher,
        }
    }

    /// The capability set this broker serves.
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Start `name`, or return the port of its running worker.
    pub async fn start(&self, name: &str) -> Result<u16> {
        let descriptor = self
            .capabilities
            .get(name)
            .ok_or_else(|| DispatchError::UnknownCapability(name.to_string()))?;

        let _guard = self.registry.lock_name(name).await;

        let (lookup, stale) = self.registry.lookup(name);
        if let Some(stale) = stale {
            stale.terminate().await;
        }
        if let Lookup::Running(port) = lookup {
            tracing::debug!(capability = %name, port, "already running");
            return Ok(port);
        }

        let worker = self.launcher.launch(descriptor).await?;
        let record = SubserviceRecord::new(name, worker);
        let port = record.port();
        self.registry.insert(record);

        tracing::info!(capability = %name, port, "capability started");
        Ok(port)
    }

    /// Terminate the worker for `name` and drop its record.
    pub async fn stop(&self, name: &str) -> Result<()> {
        if !self.capabilities.contains(name) {
            return Err(DispatchError::UnknownCapability(name.to_string()));
        }

        let _guard = self.registry.lock_name(name).await;

        let record = self
            .registry
            .remove(name)
            .ok_or_else(|| DispatchError::NotRunning(name.to_string()))?;
        let port = record.port();
        record.terminate().await;

        tracing::info!(capability = %name, port, "capability stopped");
        Ok(())
    }

    /// Every capability name this broker can start, sorted.
    pub fn list_available(&self) -> Vec<String> {
        self.capabilities.names()
    }

    /// Snapshot of running capabilities and their ports.
    pub fn list_running(&self) -> BTreeMap<String, u16> {
        self.registry.snapshot()
    }

    /// Forcefully terminate every running worker.
    pub async fn shutdown(&self) {
        let records = self.registry.drain();
        if records.is_empty() {
            return;
        }
        tracing::info!(count = records.len(), "terminating running capabilities");
        for record in records {
            let name = record.name().to_string();
            record.terminate().await;
            tracing::debug!(capability = %name, "terminated");
        }
    }

    /// Serve the control protocol on `addr` until `shutdown` fires, then
    /// terminate every worker.
    pub async fn serve(self: Arc<Self>, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
        let server = RpcServer::bind(addr, Arc::clone(&self) as Arc<dyn RpcService>).await?;
        self.serve_on(server, shutdown).await
    }

    /// Like [`serve`](Self::serve) on an already bound server.
    pub async fn serve_on(self: Arc<Self>, server: RpcServer, shutdown: CancellationToken) -> Result<()> {
        let outcome = server.serve(shutdown).await;
        self.shutdown().await;
        Ok(outcome?)
    }
}

#[async_trait]
impl RpcService for DispatchBroker {
    fn name(&self) -> &str {
        "dispatch"
    }

    async fn handle(&self, method: &str, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let to_json = |value: Result<Value>| value.map_err(|e| e.to_rpc_error());

        match method {
            methods::START => {
                let NameParams { name } = parse_params(params)?;
                to_json(self.start(&name).await.map(Value::from))
            }
            methods::STOP => {
                let NameParams { name } = parse_params(params)?;
                to_json(self.stop(&name).await.map(|()| Value::Null))
            }
            methods::LIST_AVAILABLE => Ok(Value::from(self.list_available())),
            methods::LIST_RUNNING => serde_json::to_value(self.list_running())
                .map_err(|e| JsonRpcError::internal(e.to_string())),
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}
