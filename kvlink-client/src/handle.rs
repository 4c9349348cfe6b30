//! Owned client/connection pair produced by the builder.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use kvlink_common::TopologyKind;

use crate::backend::{BackendClient, BackendConnection, NodeOptions};

/// Observable state of a [`ConnectionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open,
    Closed,
}

/// A live client and the one connection opened from it.
///
/// Teardown closes the connection before shutting the client down and may be
/// called any number of times.
pub struct ConnectionHandle {
    client: Arc<dyn BackendClient>,
    connection: Arc<dyn BackendConnection>,
    teardown_lock: Mutex<()>,
}

impl ConnectionHandle {
    pub(crate) fn new(client: Arc<dyn BackendClient>, connection: Arc<dyn BackendConnection>) -> Self {
        ConnectionHandle {
            client,
            connection,
            teardown_lock: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> TopologyKind {
        self.client.kind()
    }

    /// Target node or seed nodes the client was built with.
    pub fn nodes(&self) -> &[NodeOptions] {
        self.client.nodes()
    }

    pub fn state(&self) -> HandleState {
        if self.connection.is_closed() && self.client.is_shut_down() {
            HandleState::Closed
        } else {
            HandleState::Open
        }
    }

    pub(crate) fn connection(&self) -> Arc<dyn BackendConnection> {
        self.connection.clone()
    }

    /// Closes the connection, then shuts the client down.
    pub async fn teardown(&self) -> HandleState {
        // Serialize callers so a second teardown cannot shut the client down
        // while the first is still closing the connection.
        let _guard = self.teardown_lock.lock().await;

        if self.connection.close().await {
            debug!(kind = %self.kind(), "connection closed");
        } else {
            debug!(kind = %self.kind(), "connection already closed");
        }

        if self.client.shutdown().await {
            info!(kind = %self.kind(), "backend resources released");
        } else {
            debug!(kind = %self.kind(), "client already shut down");
        }

        self.state()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.state() == HandleState::Open {
            debug!(kind = %self.kind(), "connection handle dropped without teardown");
        }
    }
}
