//! # Cluster Client
//!
//! Purpose: Bootstrap from seed nodes, learn slot ownership, and route each
//! keyed command to the primary that owns its slot.
//!
//! ## Design Principles
//! 1. **Seed Order Matters**: Seeds are tried in configured order; the first
//!    one that answers `CLUSTER SLOTS` supplies the slot map.
//! 2. **Lazy Node Links**: Only the answering seed is dialed up front; other
//!    primaries are dialed on first use.
//! 3. **Bounded Redirects**: `MOVED` and `ASK` replies are followed, at most
//!    [`MAX_REDIRECTS`] times per command.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use kvlink_common::{CommandError, CommandResult, SetupError, SetupResult, TopologyKind};

use crate::backend::{BackendClient, BackendConnection, ClientState, NodeOptions};
use crate::node::{NodeConnection, NodeLink};
use crate::resp::RespValue;
use crate::slots::{slot_for_key, split_address, Redirect, SlotMap};

/// Redirects followed for a single command before giving up.
pub const MAX_REDIRECTS: usize = 5;

/// Cluster-aware client seeded with one or more nodes.
pub struct ClusterClient {
    seeds: Vec<NodeOptions>,
    state: ClientState,
}

impl ClusterClient {
    pub fn new(seeds: Vec<NodeOptions>) -> SetupResult<Self> {
        if seeds.is_empty() {
            return Err(SetupError::build("cluster client needs at least one seed node"));
        }
        Ok(ClusterClient {
            seeds,
            state: ClientState::default(),
        })
    }

    async fn discover(seed: &NodeOptions) -> CommandResult<(NodeConnection, SlotMap)> {
        let mut conn = NodeConnection::open(seed).await?;
        let reply = conn.exec(&[b"CLUSTER", b"SLOTS"]).await?;
        if let Some(message) = reply.error_message() {
            return Err(CommandError::Server { message });
        }
        let slots = SlotMap::from_cluster_slots(&reply, &seed.host)?;
        if slots.covered_slots() == 0 {
            return Err(CommandError::Server {
                message: "cluster reported no slot owners".to_string(),
            });
        }
        Ok((conn, slots))
    }
}

#[async_trait]
impl BackendClient for ClusterClient {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Cluster
    }

    fn nodes(&self) -> &[NodeOptions] {
        &self.seeds
    }

    async fn connect(&self) -> CommandResult<Arc<dyn BackendConnection>> {
        self.state.ensure_running()?;

        let mut last_err = None;
        for seed in &self.seeds {
            match Self::discover(seed).await {
                Ok((conn, slots)) => {
                    info!(
                        seed = %seed.address(),
                        primaries = slots.addresses().len(),
                        "cluster connection open"
                    );
                    let seed_address = seed.address();
                    let mut links = HashMap::new();
                    links.insert(seed_address.clone(), Arc::new(NodeLink::with_connection(conn)));

                    let connection: Arc<dyn BackendConnection> = Arc::new(ClusterConnection {
                        template: seed.clone(),
                        default_address: seed_address,
                        slots: RwLock::new(slots),
                        links: Mutex::new(links),
                        closed: AtomicBool::new(false),
                    });
                    self.state.track(&connection).await;
                    return Ok(connection);
                }
                Err(err) => {
                    warn!(seed = %seed.address(), error = %err, "cluster seed unavailable");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(CommandError::Closed))
    }

    async fn shutdown(&self) -> bool {
        let stopped = self.state.shutdown().await;
        if stopped {
            info!(seeds = self.seeds.len(), "cluster client shut down");
        }
        stopped
    }

    fn is_shut_down(&self) -> bool {
        self.state.is_shut_down()
    }
}

/// Slot-routed connection to a cluster.
pub struct ClusterConnection {
    /// Timeout and credential applied to every node link.
    template: NodeOptions,
    /// Node used for keyless commands and unowned slots.
    default_address: String,
    slots: RwLock<SlotMap>,
    links: Mutex<HashMap<String, Arc<NodeLink>>>,
    closed: AtomicBool,
}

impl ClusterConnection {
    async fn route(&self, key: Option<&[u8]>) -> String {
        if let Some(key) = key {
            let slots = self.slots.read().await;
            if let Some(owner) = slots.owner(slot_for_key(key)) {
                return owner.to_string();
            }
        }
        self.default_address.clone()
    }

    async fn link(&self, address: &str) -> CommandResult<Arc<NodeLink>> {
        let mut links = self.links.lock().await;
        if self.is_closed() {
            return Err(CommandError::Closed);
        }
        if let Some(link) = links.get(address) {
            return Ok(link.clone());
        }
        let (host, port) = split_address(address)?;
        let link = Arc::new(NodeLink::new(self.template.for_address(host, port)));
        links.insert(address.to_string(), link.clone());
        debug!(node = %address, "added cluster node link");
        Ok(link)
    }
}

#[async_trait]
impl BackendConnection for ClusterConnection {
    async fn execute(&self, args: &[&[u8]]) -> CommandResult<RespValue> {
        if self.is_closed() {
            return Err(CommandError::Closed);
        }

        let mut address = self.route(args.get(1).copied()).await;
        let mut asking = false;
        for _ in 0..=MAX_REDIRECTS {
            let link = self.link(&address).await?;
            let reply = link.exec(args, asking).await?;
            match Redirect::from_reply(&reply, &link.options().host) {
                Some(Redirect::Moved { slot, address: target }) => {
                    debug!(slot, from = %address, to = %target, "slot moved");
                    self.slots.write().await.assign(slot, &target);
                    address = target;
                    asking = false;
                }
                Some(Redirect::Ask { slot, address: target }) => {
                    debug!(slot, from = %address, to = %target, "slot migrating");
                    address = target;
                    asking = true;
                }
                None => return Ok(reply),
            }
        }

        Err(CommandError::Redirect {
            redirects: MAX_REDIRECTS,
        })
    }

    async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let links: Vec<_> = self.links.lock().await.drain().map(|(_, link)| link).collect();
        for link in &links {
            link.close().await;
        }
        debug!(nodes = links.len(), "cluster connection closed");
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
