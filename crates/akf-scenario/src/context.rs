//! Execution-mode context: capability acquisition and the operation trace.

use std::sync::Arc;
use std::time::Duration;

use akf_client::{CapabilityHandle, ConnectOptions, Dialer, TcpDialer, auto_connect_with, stop_capability};
use serde_json::Value;

use crate::environment::Environment;
use crate::error::{Result, ScenarioError};
use crate::script::Operation;

/// Ordered record of the capability operations a run performed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationTrace {
    operations: Vec<Operation>,
}

impl OperationTrace {
    /// Append an operation.
    pub fn push(&mut self, operation: Operation) {
        tracing::trace!(%operation, "operation");
        self.operations.push(operation);
    }

    /// Operations in order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Take the recorded operations.
    pub fn into_vec(self) -> Vec<Operation> {
        self.operations
    }
}

/// What a run needs beyond the environment: how to reach capabilities and
/// where to record what was done.
pub struct RunContext {
    options: ConnectOptions,
    dialer: Arc<dyn Dialer>,
    trace: OperationTrace,
}

impl RunContext {
    /// Context connecting over plain TCP.
    pub fn new(options: ConnectOptions) -> Self {
        Self {
            options,
            dialer: Arc::new(TcpDialer),
            trace: OperationTrace::default(),
        }
    }

    /// Use a different dialer.
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Handshake options.
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Operations performed so far.
    pub fn trace(&self) -> &OperationTrace {
        &self.trace
    }

    /// Consume the context, keeping the trace.
    pub fn into_trace(self) -> OperationTrace {
        self.trace
    }

    /// Whether the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.options.cancel.is_cancelled()
    }

    /// Acquire `capability` on the environment's guest.
    pub async fn acquire(&mut self, env: &Environment, capability: &str) -> Result<Arc<CapabilityHandle>> {
        let host = env.guest_address().await?;
        self.trace.push(Operation::start(capability));
        let handle = auto_connect_with(self.dialer.as_ref(), &host, capability, &self.options).await?;
        Ok(Arc::new(handle))
    }

    /// Call `method` on a capability.
    pub async fn invoke(&mut self, handle: &CapabilityHandle, method: &str, args: Value) -> Result<Value> {
        self.trace
            .push(Operation::call(handle.capability(), method, args.clone()));
        Ok(handle.call(method, args).await?)
    }

    /// Close a capability connection and, when `stop` is set, ask the broker
    /// to stop the capability.
    pub async fn release(&mut self, handle: &CapabilityHandle, stop: bool) -> Result<()> {
        let closed = handle.close().await;
        if stop {
            self.trace.push(Operation::stop(handle.capability()));
            stop_capability(
                self.dialer.as_ref(),
                handle.host(),
                handle.capability(),
                &self.options,
            )
            .await?;
        }
        Ok(closed?)
    }

    /// Wait for `duration`, returning early with an error on cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.options.cancel.cancelled() => Err(ScenarioError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("options", &self.options)
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_sleep_cancellation() {
        let token = CancellationToken::new();
        let ctx = RunContext::new(ConnectOptions::default().with_cancel(token.clone()));
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(
            ctx.sleep(Duration::from_secs(3600)).await,
            Err(ScenarioError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_elapses() {
        let ctx = RunContext::new(ConnectOptions::default());
        ctx.sleep(Duration::from_secs(5)).await.unwrap();
        assert!(ctx.trace().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_without_guest_records_nothing() {
        let mut ctx = RunContext::new(ConnectOptions::default());
        let env = Environment::new();
        assert!(ctx.acquire(&env, "Chromium").await.is_err());
        assert!(ctx.trace().is_empty());
    }
}
