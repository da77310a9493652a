//! The wait-until-ready handshake that turns `(host, capability)` into a
//! live [`CapabilityHandle`].
//!
//! 1. Dial the dispatch broker on `(host, broker_port)`.
//! 2. Ask it to `start` the capability and read back the port.
//! 3. Close the broker connection and dial the capability directly.
//!
//! A broker that is not up yet (refused, reset, timed out, unreachable) is
//! retried every `retry_interval` when `wait_until_ready` is set. Every
//! other failure surfaces immediately. The whole handshake is bounded by the
//! optional `deadline` and aborted when `cancel` fires.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use akf_config::{ClientConfig, DEFAULT_BROKER_PORT};
use akf_rpc::RpcConnection;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::dialer::{Dialer, TcpDialer, is_not_yet_reachable};
use crate::dispatch::DispatchClient;
use crate::error::{Error, Result};
use crate::handle::CapabilityHandle;

/// How the handshake reaches the broker.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Broker port on the guest.
    pub broker_port: u16,
    /// Keep retrying while the broker is not reachable.
    pub wait_until_ready: bool,
    /// Pause between broker dial attempts.
    pub retry_interval: Duration,
    /// Bound on a single dial.
    pub connect_timeout: Duration,
    /// Bound on the whole handshake.
    pub deadline: Option<Duration>,
    /// Aborts the handshake when cancelled.
    pub cancel: CancellationToken,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            broker_port: DEFAULT_BROKER_PORT,
            wait_until_ready: true,
            retry_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl ConnectOptions {
    /// Options from the `[client]` config section.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            broker_port: config.broker_port,
            wait_until_ready: config.wait_until_ready,
            retry_interval: config.retry_interval(),
            connect_timeout: config.connect_timeout(),
            deadline: config.deadline(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the broker port.
    pub fn with_broker_port(mut self, port: u16) -> Self {
        self.broker_port = port;
        self
    }

    /// Set whether to wait for the broker.
    pub fn with_wait_until_ready(mut self, wait: bool) -> Self {
        self.wait_until_ready = wait;
        self
    }

    /// Set the retry interval.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the per-dial timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound the whole handshake.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abort the handshake when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Acquire `capability` on `host` over plain TCP.
pub async fn auto_connect(host: &str, capability: &str, options: &ConnectOptions) -> Result<CapabilityHandle> {
    auto_connect_with(&TcpDialer, host, capability, options).await
}

/// Acquire `capability` on `host` using `dialer` for every connection.
pub async fn auto_connect_with(
    dialer: &dyn Dialer,
    host: &str,
    capability: &str,
    options: &ConnectOptions,
) -> Result<CapabilityHandle> {
    bounded(capability, options, async {
        let mut broker = open_broker(dialer, host, options).await?;
        let broker_addr = broker.peer_addr();
        let started = broker.start(capability).await;
        if let Err(e) = broker.close().await {
            tracing::debug!(error = %e, "failed to close broker connection");
        }
        let port = started?;

        let addr = SocketAddr::new(broker_addr.ip(), port);
        let stream = dialer
            .dial(addr, options.connect_timeout)
            .await
            .map_err(|source| Error::Connect { addr, source })?;

        tracing::info!(%capability, %addr, "capability connected");
        Ok::<_, Error>(CapabilityHandle::new(
            capability,
            host,
            RpcConnection::from_stream(stream)?,
        ))
    })
    .await
}

/// Open a control connection to the broker on `host`, waiting for it per
/// `options`.
pub async fn connect_broker(host: &str, options: &ConnectOptions) -> Result<DispatchClient> {
    connect_broker_with(&TcpDialer, host, options).await
}

/// Like [`connect_broker`] using `dialer`.
pub async fn connect_broker_with(
    dialer: &dyn Dialer,
    host: &str,
    options: &ConnectOptions,
) -> Result<DispatchClient> {
    bounded("dispatch broker", options, open_broker(dialer, host, options)).await
}

/// Ask the broker on `host` to stop `capability`.
pub async fn stop_capability(
    dialer: &dyn Dialer,
    host: &str,
    capability: &str,
    options: &ConnectOptions,
) -> Result<()> {
    bounded(capability, options, async {
        let mut broker = open_broker(dialer, host, options).await?;
        let stopped = broker.stop(capability).await;
        if let Err(e) = broker.close().await {
            tracing::debug!(error = %e, "failed to close broker connection");
        }
        stopped
    })
    .await
}

async fn open_broker(dialer: &dyn Dialer, host: &str, options: &ConnectOptions) -> Result<DispatchClient> {
    let addr = resolve(host, options.broker_port).await?;
    let stream = dial_until_ready(dialer, addr, options).await?;
    Ok(DispatchClient::new(RpcConnection::from_stream(stream)?))
}

async fn dial_until_ready(dialer: &dyn Dialer, addr: SocketAddr, options: &ConnectOptions) -> Result<TcpStream> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match dialer.dial(addr, options.connect_timeout).await {
            Ok(stream) => {
                tracing::debug!(%addr, attempt, "connected to dispatch broker");
                return Ok(stream);
            }
            Err(source) if is_not_yet_reachable(&source) => {
                if !options.wait_until_ready {
                    return Err(Error::BrokerUnreachable { addr, source });
                }
                tracing::info!(%addr, attempt, error = %source, "dispatch broker not reachable yet, retrying");
                tokio::time::sleep(options.retry_interval).await;
            }
            Err(source) => return Err(Error::Connect { addr, source }),
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse() {
        return Ok(SocketAddr::new(ip, port));
    }
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", host, e)))?
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("{}: no addresses", host)))
}

/// Run `work` under the caller's deadline and cancellation token.
async fn bounded<T>(
    label: &str,
    options: &ConnectOptions,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    let limited = async {
        match options.deadline {
            Some(deadline) => tokio::time::timeout(deadline, work)
                .await
                .map_err(|_| Error::DeadlineExceeded {
                    capability: label.to_string(),
                    deadline,
                })?,
            None => work.await,
        }
    };

    tokio::select! {
        _ = options.cancel.cancelled() => Err(Error::Cancelled(label.to_string())),
        result = limited => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = ClientConfig {
            broker_port: 19000,
            wait_until_ready: false,
            retry_interval_ms: 250,
            connect_timeout_ms: 750,
            deadline_secs: Some(30),
        };
        let options = ConnectOptions::from_config(&config);
        assert_eq!(options.broker_port, 19000);
        assert!(!options.wait_until_ready);
        assert_eq!(options.retry_interval, Duration::from_millis(250));
        assert_eq!(options.connect_timeout, Duration::from_millis(750));
        assert_eq!(options.deadline, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_resolve_literal_and_name() {
        let addr = resolve("10.0.0.5", 18861).await.unwrap();
        assert_eq!(addr.to_string(), "10.0.0.5:18861");

        let addr = resolve("localhost", 1).await.unwrap();
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let options = ConnectOptions::default().with_cancel(token);
        let err = bounded("X", &options, std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let options = ConnectOptions::default().with_deadline(Duration::from_secs(5));
        let err = bounded("X", &options, std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded { deadline, .. } if deadline == Duration::from_secs(5)));
    }
}
