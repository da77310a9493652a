//! Host-side connection broker for AKF.
//!
//! Resolves a capability name on a guest to a live [`CapabilityHandle`] by
//! asking the guest's dispatch broker to start it, tolerating a guest whose
//! agent is not up yet.
//!
//! # Example
//!
//! ```no_run
//! use akf_client::{ConnectOptions, auto_connect};
//! use std::time::Duration;
//!
//! # async fn example() -> akf_client::Result<()> {
//! let options = ConnectOptions::default().with_deadline(Duration::from_secs(600));
//! let chromium = auto_connect("10.0.0.5", "Chromium", &options).await?;
//! chromium.call("goto", serde_json::json!({"url": "http://example.com"})).await?;
//! chromium.close().await?;
//! # Ok(())
//! # }
//! ```

mod dialer;
mod dispatch;
mod error;
mod handle;
mod handshake;

pub use dialer::{Dialer, TcpDialer, is_not_yet_reachable};
pub use dispatch::DispatchClient;
pub use error::{Error, Result};
pub use handle::CapabilityHandle;
pub use handshake::{
    ConnectOptions, auto_connect, auto_connect_with, connect_broker, connect_broker_with,
    stop_capability,
};
