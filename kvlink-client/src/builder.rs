//! # Resource Builder
//!
//! Purpose: Turn a selected [`Topology`] into a live [`ConnectionHandle`].
//!
//! ## Design Principles
//! 1. **Single Branch**: The only standalone/cluster decision is one `match`.
//! 2. **No Half-Built Graphs**: When the connection cannot be opened, the
//!    client created for it is shut down before the error is returned.
//! 3. **Injectable Backend**: `build_with` accepts any [`Backend`], so tests
//!    can observe exactly what would be dialed.

use tracing::{info, warn};

use kvlink_common::{SetupError, SetupResult, Topology};

use crate::backend::{Backend, NodeOptions, TcpBackend};
use crate::handle::ConnectionHandle;

/// Builds the resource graph for `topology` over TCP.
pub async fn build(topology: &Topology) -> SetupResult<ConnectionHandle> {
    build_with(&TcpBackend, topology).await
}

/// Builds the resource graph for `topology` using `backend`.
///
/// Each call creates an independent client and connection.
pub async fn build_with(backend: &dyn Backend, topology: &Topology) -> SetupResult<ConnectionHandle> {
    let spec = topology.spec();
    let mut nodes: Vec<NodeOptions> = spec
        .endpoints()
        .iter()
        .map(|endpoint| NodeOptions::from_endpoint(endpoint, spec))
        .collect();

    let client = match topology {
        Topology::Standalone { .. } => {
            if nodes.len() != 1 {
                return Err(SetupError::build(format!(
                    "standalone topology needs exactly one endpoint, got {}",
                    nodes.len()
                )));
            }
            backend.standalone_client(nodes.remove(0))?
        }
        Topology::Cluster { .. } => backend.cluster_client(nodes)?,
    };

    let target = describe(client.nodes());
    info!(
        kind = %topology.kind(),
        nodes = %target,
        authenticated = spec.credential().is_some(),
        timeout_ms = spec.timeout().as_millis() as u64,
        "opening backend connection"
    );

    match client.connect().await {
        Ok(connection) => Ok(ConnectionHandle::new(client, connection)),
        Err(source) => {
            client.shutdown().await;
            warn!(kind = %topology.kind(), nodes = %target, error = %source, "backend connection failed");
            Err(SetupError::Connection { target, source })
        }
    }
}

fn describe(nodes: &[NodeOptions]) -> String {
    nodes
        .iter()
        .map(NodeOptions::address)
        .collect::<Vec<_>>()
        .join(",")
}
