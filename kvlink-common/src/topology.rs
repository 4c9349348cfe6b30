//! Topology selection: one branch, decided once, from a typed flag.

use std::fmt;

use crate::endpoint::{Endpoint, EndpointSpec};
use crate::error::{SetupError, SetupResult};

/// Deployment shape of the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// A single node addressed directly. The spec holds exactly one endpoint.
    Standalone { spec: EndpointSpec },
    /// A sharded deployment bootstrapped from one or more seed nodes.
    Cluster { spec: EndpointSpec },
}

/// Flavor of a topology without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyKind {
    Standalone,
    Cluster,
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyKind::Standalone => write!(f, "standalone"),
            TopologyKind::Cluster => write!(f, "cluster"),
        }
    }
}

impl Topology {
    pub fn kind(&self) -> TopologyKind {
        match self {
            Topology::Standalone { .. } => TopologyKind::Standalone,
            Topology::Cluster { .. } => TopologyKind::Cluster,
        }
    }

    pub fn spec(&self) -> &EndpointSpec {
        match self {
            Topology::Standalone { spec } | Topology::Cluster { spec } => spec,
        }
    }

    /// Target node for standalone, seed nodes in configured order for cluster.
    pub fn endpoints(&self) -> &[Endpoint] {
        self.spec().endpoints()
    }
}

/// Chooses the topology for a parsed spec.
///
/// A standalone selection with more than one host is rejected instead of
/// quietly using the first entry.
pub fn select(spec: EndpointSpec, is_cluster: bool) -> SetupResult<Topology> {
    if is_cluster {
        return Ok(Topology::Cluster { spec });
    }

    match spec.len() {
        1 => Ok(Topology::Standalone { spec }),
        n => Err(SetupError::configuration(format!(
            "ambiguous topology: {} hosts configured but cluster mode is disabled",
            n
        ))),
    }
}
