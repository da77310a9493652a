//! Client side of a JSON-RPC connection.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::{Result, RpcError};
use crate::framing::{read_frame, write_frame};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// An open JSON-RPC channel to a broker or capability.
///
/// Calls are strictly sequential: one request is written and its response
/// read before the next call starts. Wrap the connection in a mutex to share
/// it between tasks.
pub struct RpcConnection {
    /// Address of the remote end.
    peer: SocketAddr,
    /// Buffered reader over the socket.
    reader: BufReader<OwnedReadHalf>,
    /// Buffered writer over the socket.
    writer: BufWriter<OwnedWriteHalf>,
    /// Counter for generating unique request IDs.
    next_id: u64,
    /// Upper bound on a single call, if any.
    call_timeout: Option<Duration>,
}

impl RpcConnection {
    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            peer,
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            next_id: 1,
            call_timeout: None,
        })
    }

    /// Open a TCP connection to `addr`.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        tracing::debug!(peer = %addr, "opened RPC connection");
        Self::from_stream(stream)
    }

    /// Limit how long a single call may wait for its response.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Send a request and wait for the matching response.
    ///
    /// A JSON-RPC error answer is returned as [`RpcError::Remote`].
    pub async fn call(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);

        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.round_trip(&request))
                .await
                .map_err(|_| RpcError::Timeout)?,
            None => self.round_trip(&request).await,
        }
    }

    /// Typed variant of [`call`](Self::call).
    pub async fn call_typed<P, R>(&mut self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let params = if params.is_null() { None } else { Some(params) };
        let result = self.call(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Send a notification (no response expected).
    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        let body = serde_json::to_vec(&notification)?;
        write_frame(&mut self.writer, &body).await
    }

    async fn round_trip(&mut self, request: &JsonRpcRequest) -> Result<Value> {
        let body = serde_json::to_vec(request)?;
        write_frame(&mut self.writer, &body).await?;

        tracing::trace!(peer = %self.peer, method = %request.method, id = request.id, "sent RPC request");

        loop {
            let frame = read_frame(&mut self.reader)
                .await?
                .ok_or(RpcError::ConnectionClosed)?;
            let response: JsonRpcResponse = serde_json::from_slice(&frame)?;

            if response.id != request.id {
                tracing::warn!(
                    expected = request.id,
                    got = response.id,
                    "discarding response for a different request"
                );
                continue;
            }

            return response.into_result().map_err(RpcError::from);
        }
    }

    /// Close the connection, signalling EOF to the peer.
    pub async fn close(mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        tracing::debug!(peer = %self.peer, "closed RPC connection");
        Ok(())
    }
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection")
            .field("peer", &self.peer)
            .field("next_id", &self.next_id)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody is listening on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = RpcConnection::connect(addr).await.unwrap_err();
        assert!(matches!(err, RpcError::Io(_)));
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept but never answer
        let silent = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let mut conn = RpcConnection::connect(addr)
            .await
            .unwrap()
            .with_call_timeout(Duration::from_millis(50));
        let err = conn.call("start", None).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout));

        silent.abort();
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let closer = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut conn = RpcConnection::connect(addr).await.unwrap();
        closer.await.unwrap();
        let err = conn.call("list_running", None).await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::ConnectionClosed | RpcError::Io(_)
        ));
    }
}
