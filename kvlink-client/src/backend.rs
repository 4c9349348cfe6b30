//! # Backend Seams
//!
//! Purpose: Describe the client and connection objects the builder wires
//! together, so the TCP implementation and test doubles are interchangeable.
//!
//! ## Design Principles
//! 1. **Two-Level Ownership**: A client creates connections; a connection
//!    never outlives the client that created it.
//! 2. **Cheap Creation**: Creating a client performs no I/O; `connect` is the
//!    first network touch.
//! 3. **Idempotent Teardown**: `close` and `shutdown` report whether the call
//!    did the work, and are no-ops afterwards.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use kvlink_common::{
    CommandError, CommandResult, Credential, Endpoint, EndpointSpec, SetupResult, TopologyKind,
};

use crate::cluster::ClusterClient;
use crate::resp::RespValue;
use crate::standalone::StandaloneClient;

/// Fully resolved settings for one backend node.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeOptions {
    pub host: String,
    pub port: u16,
    /// Connect and per-command timeout.
    pub timeout: Duration,
    pub credential: Option<Credential>,
}

impl NodeOptions {
    /// Resolves an endpoint with the timeout and credential shared by all nodes.
    pub fn from_endpoint(endpoint: &Endpoint, spec: &EndpointSpec) -> Self {
        NodeOptions {
            host: endpoint.host().to_string(),
            port: endpoint.resolved_port(),
            timeout: spec.timeout(),
            credential: spec.credential().cloned(),
        }
    }

    /// Same timeout and credential, different node.
    pub fn for_address(&self, host: impl Into<String>, port: u16) -> Self {
        NodeOptions {
            host: host.into(),
            port,
            timeout: self.timeout,
            credential: self.credential.clone(),
        }
    }

    /// `host:port` string used for dialing and as a routing key.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for NodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("authenticated", &self.credential.is_some())
            .finish()
    }
}

/// An open connection able to execute commands.
///
/// Keyed commands carry their key as the first argument after the command
/// name; cluster connections route on it.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    /// Sends one command and returns the raw reply, error replies included.
    async fn execute(&self, args: &[&[u8]]) -> CommandResult<RespValue>;

    /// Closes the connection. Returns false when it was already closed.
    async fn close(&self) -> bool;

    fn is_closed(&self) -> bool;
}

/// A network client bound to one topology flavor.
#[async_trait]
pub trait BackendClient: Send + Sync {
    fn kind(&self) -> TopologyKind;

    /// Target node (standalone) or seed nodes in configured order (cluster).
    fn nodes(&self) -> &[NodeOptions];

    /// Opens a connection. This is where network I/O first happens.
    async fn connect(&self) -> CommandResult<Arc<dyn BackendConnection>>;

    /// Shuts the client down, closing any connection it still tracks.
    /// Returns false when it was already shut down.
    async fn shutdown(&self) -> bool;

    fn is_shut_down(&self) -> bool;
}

/// Factory for the two client flavors.
pub trait Backend: Send + Sync {
    fn standalone_client(&self, node: NodeOptions) -> SetupResult<Arc<dyn BackendClient>>;

    fn cluster_client(&self, seeds: Vec<NodeOptions>) -> SetupResult<Arc<dyn BackendClient>>;
}

/// Backend speaking RESP2 over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBackend;

impl Backend for TcpBackend {
    fn standalone_client(&self, node: NodeOptions) -> SetupResult<Arc<dyn BackendClient>> {
        Ok(Arc::new(StandaloneClient::new(node)))
    }

    fn cluster_client(&self, seeds: Vec<NodeOptions>) -> SetupResult<Arc<dyn BackendClient>> {
        Ok(Arc::new(ClusterClient::new(seeds)?))
    }
}

/// Shutdown flag plus the connections a client handed out.
#[derive(Default)]
pub(crate) struct ClientState {
    shut_down: AtomicBool,
    issued: Mutex<Vec<Weak<dyn BackendConnection>>>,
}

impl ClientState {
    pub(crate) fn ensure_running(&self) -> CommandResult<()> {
        if self.is_shut_down() {
            return Err(CommandError::Closed);
        }
        Ok(())
    }

    pub(crate) async fn track(&self, connection: &Arc<dyn BackendConnection>) {
        let mut issued = self.issued.lock().await;
        issued.retain(|weak| weak.strong_count() > 0);
        issued.push(Arc::downgrade(connection));
    }

    pub(crate) async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        let issued: Vec<_> = self.issued.lock().await.drain(..).collect();
        for connection in issued.iter().filter_map(Weak::upgrade) {
            if connection.close().await {
                warn!("closed a connection that was still open at client shutdown");
            }
        }
        true
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}
