//! JSON-RPC plumbing shared by the AKF dispatch broker, its capability
//! workers, and the host-side client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RpcConnection (client)          RpcServer (service host)   │
//! │  - request ids, call timeout     - accept loop + shutdown   │
//! │  - typed calls                   - one task per connection  │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  framing                                                    │
//! │  - JSON-RPC 2.0 with Content-Length framing over TCP        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every message on the wire looks like:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", "id": 1, "method": "start", "params": {"name": "Chromium"}}
//! ```

pub mod connection;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod server;

pub use connection::RpcConnection;
pub use error::{Result, RpcError};
pub use framing::{MAX_FRAME_LEN, read_frame, write_frame};
pub use protocol::{
    IncomingMessage, JSONRPC_VERSION, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, parse_params,
};
pub use server::{RpcServer, RpcService};
