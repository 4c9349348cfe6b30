//! # kvlink Client
//!
//! Purpose: Resolve backend settings into exactly one live resource graph,
//! standalone or cluster, and hand callers a topology-agnostic command surface.
//!
//! ## Design Principles
//! 1. **Explicit Wiring**: Resources are built once at startup and passed by
//!    `Arc`; there is no global client.
//! 2. **Validate Before Dialing**: Settings are parsed and the topology chosen
//!    before any socket is opened.
//! 3. **Ordered Teardown**: Connections close before their client shuts down.
//! 4. **Protocol Clarity**: RESP2 is encoded and decoded explicitly.

mod backend;
mod bootstrap;
mod builder;
mod cluster;
mod commands;
mod handle;
mod lifecycle;
mod node;
mod resp;
mod slots;
mod standalone;

pub use backend::{Backend, BackendClient, BackendConnection, NodeOptions, TcpBackend};
pub use bootstrap::{establish, establish_with, Established};
pub use builder::{build, build_with};
pub use cluster::{ClusterClient, ClusterConnection, MAX_REDIRECTS};
pub use commands::CommandSurface;
pub use handle::{ConnectionHandle, HandleState};
pub use lifecycle::LifecycleManager;
pub use resp::RespValue;
pub use slots::{slot_for_key, Redirect, SlotMap, SLOT_COUNT};
pub use standalone::{StandaloneClient, StandaloneConnection};

pub use kvlink_common::{
    BackendSettings, CommandError, CommandResult, Credential, SetupError, SetupResult, Topology,
    TopologyKind,
};
