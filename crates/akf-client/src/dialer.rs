//! Opening TCP streams, with failure classification for the retry loop.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Opens a TCP stream to an address.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to `addr`, giving up after `timeout`.
    async fn dial(&self, addr: SocketAddr, timeout: Duration) -> std::io::Result<TcpStream>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("connect to {} timed out after {:?}", addr, timeout),
            )),
        }
    }
}

/// Whether a connect failure means the peer is not up yet.
pub fn is_not_yet_reachable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::TimedOut
            | ErrorKind::NotConnected
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
    )
}
