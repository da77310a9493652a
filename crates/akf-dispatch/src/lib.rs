//! Guest-side dispatch broker for AKF capabilities.
//!
//! The broker is the single point of truth inside the guest for which
//! capability services are running and on which port. Host-side tooling
//! asks it to `start` a capability by name and then connects to the
//! returned port directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  DispatchBroker (RpcService on the well-known port)         │
//! │  - start / stop / list_available / list_running             │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                  │
//!            ▼                                  ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │  Registry                │   │  WorkerLauncher              │
//! │  - one record per name   │   │  - ProcessLauncher (child)   │
//! │  - per-name start lock   │   │  - InProcessLauncher (task)  │
//! └──────────────────────────┘   └──────────────────────────────┘
//!                                               │
//!                                               ▼
//!                                 ┌──────────────────────────────┐
//!                                 │  capability worker           │
//!                                 │  (host::serve_capability)    │
//!                                 └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use akf_dispatch::{CapabilityRegistry, DispatchBroker, ProcessLauncher};
//!
//! let launcher = Arc::new(ProcessLauncher::current_exe()?);
//! let broker = Arc::new(DispatchBroker::new(CapabilityRegistry::builtin(), launcher));
//! broker.serve("0.0.0.0:18861".parse()?, shutdown).await?;
//! ```

pub mod artifacts;
pub mod broker;
pub mod capability;
pub mod error;
pub mod host;
pub mod launcher;
pub mod protocol;
pub mod registry;

pub use artifacts::{ArtifactService, PrefetchRecord};
pub use broker::DispatchBroker;
pub use capability::{ARTIFACT_SERVICE, CapabilityDescriptor, CapabilityKind, CapabilityRegistry};
pub use error::{DispatchError, Result};
pub use host::{builtin_service, builtin_services, serve_capability};
pub use launcher::{InProcessLauncher, ProcessLauncher, Worker, WorkerLauncher};
pub use protocol::{NameParams, codes, methods};
pub use registry::{Registry, SubserviceRecord};
