//! Standalone client: one node, one connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use kvlink_common::{CommandError, CommandResult, TopologyKind};

use crate::backend::{BackendClient, BackendConnection, ClientState, NodeOptions};
use crate::node::{NodeConnection, NodeLink};
use crate::resp::RespValue;

/// Client targeting a single backend node.
pub struct StandaloneClient {
    node: [NodeOptions; 1],
    state: ClientState,
}

impl StandaloneClient {
    pub fn new(node: NodeOptions) -> Self {
        StandaloneClient {
            node: [node],
            state: ClientState::default(),
        }
    }
}

#[async_trait]
impl BackendClient for StandaloneClient {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Standalone
    }

    fn nodes(&self) -> &[NodeOptions] {
        &self.node
    }

    async fn connect(&self) -> CommandResult<Arc<dyn BackendConnection>> {
        self.state.ensure_running()?;
        let conn = NodeConnection::open(&self.node[0]).await?;
        info!(node = %self.node[0].address(), "standalone connection open");

        let connection: Arc<dyn BackendConnection> = Arc::new(StandaloneConnection {
            link: NodeLink::with_connection(conn),
            closed: AtomicBool::new(false),
        });
        self.state.track(&connection).await;
        Ok(connection)
    }

    async fn shutdown(&self) -> bool {
        let stopped = self.state.shutdown().await;
        if stopped {
            info!(node = %self.node[0].address(), "standalone client shut down");
        }
        stopped
    }

    fn is_shut_down(&self) -> bool {
        self.state.is_shut_down()
    }
}

/// Connection to the single standalone node.
pub struct StandaloneConnection {
    link: NodeLink,
    closed: AtomicBool,
}

#[async_trait]
impl BackendConnection for StandaloneConnection {
    async fn execute(&self, args: &[&[u8]]) -> CommandResult<RespValue> {
        if self.is_closed() {
            return Err(CommandError::Closed);
        }
        self.link.exec(args, false).await
    }

    async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.link.close().await;
        debug!(node = %self.link.options().address(), "standalone connection closed");
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
