//! Typed accessor for an acquired capability connection.

use std::net::SocketAddr;

use akf_rpc::RpcConnection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// A live connection to one capability, returned by the handshake.
///
/// Calls go through `&self` so a handle can be shared (for example through
/// an `Arc` stored in a scenario environment). The connection stays open
/// until [`close`](Self::close) is called or the handle is dropped.
pub struct CapabilityHandle {
    capability: String,
    host: String,
    peer: SocketAddr,
    conn: Mutex<Option<RpcConnection>>,
}

impl CapabilityHandle {
    /// Wrap a connection to `capability` on `host`.
    pub fn new(capability: impl Into<String>, host: impl Into<String>, conn: RpcConnection) -> Self {
        Self {
            capability: capability.into(),
            host: host.into(),
            peer: conn.peer_addr(),
            conn: Mutex::new(Some(conn)),
        }
    }

    /// Capability name.
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Host the capability was acquired from.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Address of the capability worker.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the connection is still open.
    pub async fn is_open(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Invoke `method` on the capability.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::Closed(self.capability.clone()))?;
        let params = if params.is_null() { None } else { Some(params) };
        tracing::debug!(capability = %self.capability, %method, "capability call");
        Ok(conn.call(method, params).await?)
    }

    /// Typed variant of [`call`](Self::call).
    pub async fn call_typed<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let result = self.call(method, serde_json::to_value(params)?).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Close the connection. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.close().await?;
            tracing::debug!(capability = %self.capability, "closed capability connection");
        }
        Ok(())
    }
}

impl std::fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityHandle")
            .field("capability", &self.capability)
            .field("host", &self.host)
            .field("peer", &self.peer)
            .finish()
    }
}
