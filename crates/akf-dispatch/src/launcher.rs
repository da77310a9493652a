//! Launching capability workers as isolated units.
//!
//! Two launchers implement [`WorkerLauncher`]:
//!
//! - [`ProcessLauncher`] spawns one child process per capability. Built-ins
//!   re-execute the current binary as `akf capability <Name>`; configured
//!   capabilities run their own command. The child announces its port with a
//!   single `AKF_CAPABILITY_PORT=<port>` line on stdout.
//! - [`InProcessLauncher`] serves an [`RpcService`] on an ephemeral port in a
//!   separate tokio task. Used by tests and by `akf agent --in-process`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use akf_rpc::{RpcServer, RpcService};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capability::{CapabilityDescriptor, CapabilityKind};
use crate::error::{DispatchError, Result};
use crate::protocol::{BIND_ENV, parse_port_line};

/// Default time a worker has to announce its port.
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A running capability worker.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Port the worker listens on.
    fn port(&self) -> u16;

    /// Whether the worker is still running.
    fn is_alive(&mut self) -> bool;

    /// Forcefully stop the worker. Safe to call on a worker that already exited.
    async fn terminate(&mut self) -> Result<()>;
}

/// Brings up a worker for a capability.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
    /// Launch `descriptor` and return once its port is known.
    async fn launch(&self, descriptor: &CapabilityDescriptor) -> Result<Box<dyn Worker>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Child processes
// ─────────────────────────────────────────────────────────────────────────────

/// Launches each capability in its own child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    /// Binary re-executed for built-in capabilities.
    program: PathBuf,
    /// Interface workers are told to bind.
    bind: IpAddr,
    /// How long a worker may take to print its port line.
    launch_timeout: Duration,
}

impl ProcessLauncher {
    /// Launcher re-executing `program` for built-ins.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
        }
    }

    /// Launcher re-executing the running binary.
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Interface workers bind.
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Time allowed for the port announcement.
    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    fn command_for(&self, descriptor: &CapabilityDescriptor) -> Command {
        let bind = self.bind.to_string();
        match descriptor.kind() {
            CapabilityKind::Builtin => {
                let mut cmd = Command::new(&self.program);
                cmd.arg("capability")
                    .arg(descriptor.name())
                    .arg("--bind")
                    .arg(&bind);
                cmd
            }
            CapabilityKind::Command(entry) => {
                let mut cmd = Command::new(&entry.command);
                cmd.args(&entry.args).envs(&entry.env).env(BIND_ENV, &bind);
                cmd
            }
        }
    }

    async fn read_port(&self, lines: &mut Lines<BufReader<ChildStdout>>) -> std::result::Result<u16, String> {
        match tokio::time::timeout(self.launch_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                parse_port_line(&line).ok_or_else(|| format!("unexpected first line: {:?}", line))
            }
            Ok(Ok(None)) => Err("worker exited before reporting its port".to_string()),
            Ok(Err(e)) => Err(format!("failed to read worker output: {}", e)),
            Err(_) => Err(format!(
                "no port reported within {}s",
                self.launch_timeout.as_secs_f64()
            )),
        }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, descriptor: &CapabilityDescriptor) -> Result<Box<dyn Worker>> {
        let name = descriptor.name();
        let mut cmd = self.command_for(descriptor);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let stderr pass through for debugging
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| DispatchError::launch_failed(name, format!("spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DispatchError::launch_failed(name, "failed to capture stdout"))?;
        let mut lines = BufReader::new(stdout).lines();

        let port = match self.read_port(&mut lines).await {
            Ok(port) => port,
            Err(reason) => {
                let _ = child.kill().await;
                return Err(DispatchError::launch_failed(name, reason));
            }
        };

        // Keep draining so the worker never blocks on a full pipe
        let capability = name.to_string();
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(capability = %capability, output = %line, "worker output");
            }
        });

        tracing::debug!(capability = %name, port, pid = ?child.id(), "worker process started");

        Ok(Box::new(ChildWorker { port, child }))
    }
}

/// A worker running as a child process.
struct ChildWorker {
    port: u16,
    child: Child,
}

#[async_trait]
impl Worker for ChildWorker {
    fn port(&self) -> u16 {
        self.port
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self) -> Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        self.child.kill().await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Launches capabilities as tasks inside the current process.
pub struct InProcessLauncher {
    services: HashMap<String, Arc<dyn RpcService>>,
    bind: IpAddr,
    launches: Mutex<HashMap<String, usize>>,
}

impl InProcessLauncher {
    /// Launcher with no services, listening on loopback.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            launches: Mutex::new(HashMap::new()),
        }
    }

    /// Launcher serving every built-in capability.
    pub fn with_builtins() -> Self {
        crate::host::builtin_services()
            .into_iter()
            .fold(Self::new(), |launcher, (name, service)| {
                launcher.with_service(name, service)
            })
    }

    /// Serve `service` whenever `name` is launched.
    pub fn with_service(mut self, name: impl Into<String>, service: Arc<dyn RpcService>) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    /// Interface the services bind.
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    /// How many times `name` has been launched.
    pub fn launch_count(&self, name: &str) -> usize {
        self.launches.lock().get(name).copied().unwrap_or(0)
    }
}

impl Default for InProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, descriptor: &CapabilityDescriptor) -> Result<Box<dyn Worker>> {
        let name = descriptor.name();
        let service = self.services.get(name).cloned().ok_or_else(|| {
            DispatchError::launch_failed(name, "no in-process service registered")
        })?;

        let server = RpcServer::bind(SocketAddr::new(self.bind, 0), service)
            .await
            .map_err(|e| DispatchError::launch_failed(name, e.to_string()))?;
        let port = server.local_addr()?.port();

        *self.launches.lock().entry(name.to_string()).or_insert(0) += 1;

        let token = CancellationToken::new();
        let handle = tokio::spawn(server.serve(token.clone()));

        tracing::debug!(capability = %name, port, "in-process worker started");

        Ok(Box::new(TaskWorker {
            port,
            token,
            handle: Some(handle),
        }))
    }
}

/// A worker running as a tokio task.
struct TaskWorker {
    port: u16,
    token: CancellationToken,
    handle: Option<JoinHandle<akf_rpc::Result<()>>>,
}

#[async_trait]
impl Worker for TaskWorker {
    fn port(&self) -> u16 {
        self.port
    }

    fn is_alive(&mut self) -> bool {
        !self.token.is_cancelled() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    async fn terminate(&mut self) -> Result<()> {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(result) => result?,
                Err(e) => tracing::warn!(port = self.port, error = %e, "worker task ended abnormally"),
            }
        }
        Ok(())
    }
}

impl Drop for TaskWorker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
