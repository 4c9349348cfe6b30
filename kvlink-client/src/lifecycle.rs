//! # Lifecycle Manager
//!
//! Purpose: Own the single [`ConnectionHandle`] of the process and release it
//! in order when shutdown is requested from any path.
//!
//! ## Design Principles
//! 1. **Register Once**: A second registration is a configuration error.
//! 2. **Ordered Teardown**: The connection closes before the client shuts down.
//! 3. **Idempotent Shutdown**: Signal handlers, normal exit, and test cleanup
//!    may all call `teardown`; only the first does work.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use kvlink_common::{SetupError, SetupResult};

use crate::handle::{ConnectionHandle, HandleState};

/// Registry for the process-wide connection handle.
#[derive(Default)]
pub struct LifecycleManager {
    handle: OnceLock<Arc<ConnectionHandle>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of the handle for teardown at shutdown.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> SetupResult<()> {
        let kind = handle.kind();
        self.handle.set(handle).map_err(|_| {
            SetupError::configuration("a connection handle is already registered")
        })?;
        debug!(%kind, "connection handle registered");
        Ok(())
    }

    pub fn handle(&self) -> Option<&Arc<ConnectionHandle>> {
        self.handle.get()
    }

    /// State of the registered handle, `None` before registration.
    pub fn state(&self) -> Option<HandleState> {
        self.handle.get().map(|handle| handle.state())
    }

    /// Closes the connection, then shuts the client down.
    ///
    /// Returns the terminal state, or `None` when nothing was registered.
    pub async fn teardown(&self) -> Option<HandleState> {
        match self.handle.get() {
            Some(handle) => Some(handle.teardown().await),
            None => {
                debug!("teardown requested with no registered handle");
                None
            }
        }
    }

    /// Waits for Ctrl-C, then tears down.
    pub async fn teardown_on_ctrl_c(&self) -> std::io::Result<Option<HandleState>> {
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        Ok(self.teardown().await)
    }
}
