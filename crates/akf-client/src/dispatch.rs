//! Typed calls to the dispatch broker.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use akf_dispatch::{NameParams, methods};
use akf_rpc::RpcConnection;

use crate::error::{Error, Result};

/// An open control connection to a dispatch broker.
#[derive(Debug)]
pub struct DispatchClient {
    conn: RpcConnection,
}

impl DispatchClient {
    /// Wrap an open connection.
    pub fn new(conn: RpcConnection) -> Self {
        Self { conn }
    }

    /// Connect once to the broker at `addr`, without retrying.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Ok(Self::new(RpcConnection::connect(addr).await?))
    }

    /// Broker address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.conn.peer_addr()
    }

    /// Start `name` and return its port.
    pub async fn start(&mut self, name: &str) -> Result<u16> {
        self.conn
            .call_typed(methods::START, &NameParams::new(name))
            .await
            .map_err(|e| Error::from_broker(e, name))
    }

    /// Stop `name`.
    pub async fn stop(&mut self, name: &str) -> Result<()> {
        self.conn
            .call(methods::STOP, Some(serde_json::to_value(NameParams::new(name))?))
            .await
            .map(|_| ())
            .map_err(|e| Error::from_broker(e, name))
    }

    /// Capability names the broker can start.
    pub async fn list_available(&mut self) -> Result<Vec<String>> {
        Ok(self.conn.call_typed(methods::LIST_AVAILABLE, &()).await?)
    }

    /// Running capabilities and their ports.
    pub async fn list_running(&mut self) -> Result<BTreeMap<String, u16>> {
        Ok(self.conn.call_typed(methods::LIST_RUNNING, &()).await?)
    }

    /// Close the control connection.
    pub async fn close(self) -> Result<()> {
        Ok(self.conn.close().await?)
    }
}
