//! Hosting an [`RpcService`] on a TCP listener.
//!
//! Each accepted connection gets its own task, so a slow call on one
//! connection never blocks callers on another. Requests on a single
//! connection are answered in order.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RpcError};
use crate::framing::{read_frame, write_frame};
use crate::protocol::{IncomingMessage, JsonRpcError, JsonRpcResponse};

/// A named set of operations reachable over JSON-RPC.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handle one call. Errors are sent back to the caller verbatim.
    async fn handle(&self, method: &str, params: Option<Value>) -> std::result::Result<Value, JsonRpcError>;
}

/// A bound listener serving one [`RpcService`].
pub struct RpcServer {
    listener: TcpListener,
    service: Arc<dyn RpcService>,
}

impl RpcServer {
    /// Bind to `addr`. Use port 0 for an ephemeral port.
    pub async fn bind(addr: SocketAddr, service: Arc<dyn RpcService>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::transport(format!("failed to bind {}: {}", addr, e)))?;
        Ok(Self { listener, service })
    }

    /// Serve on an already bound listener.
    pub fn from_listener(listener: TcpListener, service: Arc<dyn RpcService>) -> Self {
        Self { listener, service }
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Open connections are cancelled together with the listener.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(service = %self.service.name(), %addr, "serving");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(service = %self.service.name(), "listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let service = Arc::clone(&self.service);
                            let token = shutdown.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, service, token).await {
                                    tracing::debug!(%peer, error = %e, "connection ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            // Transient accept failures (e.g. fd exhaustion) must not kill the server
                            tracing::warn!(error = %e, "accept failed");
                        }
                    }
                }
            }
        }
    }
}

/// Read requests from one connection and answer them until EOF or cancellation.
async fn handle_connection(
    stream: TcpStream,
    service: Arc<dyn RpcService>,
    shutdown: CancellationToken,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    tracing::debug!(service = %service.name(), %peer, "connection accepted");

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = read_frame(&mut reader) => frame?,
        };

        let Some(frame) = frame else {
            tracing::debug!(service = %service.name(), %peer, "peer closed connection");
            return Ok(());
        };

        let message: IncomingMessage = match serde_json::from_slice(&frame) {
            Ok(message) => message,
            Err(e) => {
                // Without an id there is nobody to answer
                tracing::warn!(%peer, error = %e, "dropping malformed message");
                continue;
            }
        };

        let outcome = service.handle(&message.method, message.params).await;

        let Some(id) = message.id else {
            if let Err(e) = outcome {
                tracing::debug!(method = %message.method, error = %e, "notification failed");
            }
            continue;
        };

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                tracing::debug!(method = %message.method, code = error.code, message = %error.message, "call failed");
                JsonRpcResponse::failure(id, error)
            }
        };

        let body = serde_json::to_vec(&response)?;
        write_frame(&mut writer, &body).await?;
    }
}
