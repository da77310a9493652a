//! Hosting a capability inside a worker process.
//!
//! A worker binds an ephemeral port, announces it on stdout with
//! [`port_line`](crate::protocol::port_line), then serves until cancelled.

use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use akf_rpc::{RpcServer, RpcService};
use tokio_util::sync::CancellationToken;

use crate::artifacts::ArtifactService;
use crate::capability::ARTIFACT_SERVICE;
use crate::error::Result;
use crate::protocol::port_line;

/// Every capability service compiled into this binary.
pub fn builtin_services() -> Vec<(String, Arc<dyn RpcService>)> {
    vec![(
        ARTIFACT_SERVICE.to_string(),
        Arc::new(ArtifactService::new()) as Arc<dyn RpcService>,
    )]
}

/// Look up a built-in capability service by name.
pub fn builtin_service(name: &str) -> Option<Arc<dyn RpcService>> {
    builtin_services()
        .into_iter()
        .find_map(|(n, service)| (n == name).then_some(service))
}

/// Serve `service` on an ephemeral port of `bind`, announcing the port on
/// stdout before accepting connections.
pub async fn serve_capability(
    service: Arc<dyn RpcService>,
    bind: IpAddr,
    shutdown: CancellationToken,
) -> Result<()> {
    let server = RpcServer::bind(SocketAddr::new(bind, 0), service).await?;
    let port = server.local_addr()?.port();

    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", port_line(port))?;
        stdout.flush()?;
    }

    server.serve(shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert!(builtin_service(ARTIFACT_SERVICE).is_some());
        assert!(builtin_service("Chromium").is_none());
    }
}
