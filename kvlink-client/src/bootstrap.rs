//! Startup sequence: settings, topology, resources, registration.

use std::sync::Arc;

use tracing::info;

use kvlink_common::{BackendSettings, SetupResult};

use crate::backend::{Backend, TcpBackend};
use crate::builder::build_with;
use crate::commands::CommandSurface;
use crate::lifecycle::LifecycleManager;

/// Everything the rest of the process needs from the backend layer.
pub struct Established {
    /// Shared command surface for cache-repository callers.
    pub commands: Arc<CommandSurface>,
    /// Owner of the connection; call `teardown` at shutdown.
    pub lifecycle: Arc<LifecycleManager>,
}

/// Resolves settings and connects over TCP.
pub async fn establish(settings: &BackendSettings) -> SetupResult<Established> {
    establish_with(&TcpBackend, settings).await
}

/// Resolves settings and connects through `backend`.
///
/// Parsing and topology selection finish before any connection attempt; the
/// command surface is only returned once the handle is registered.
pub async fn establish_with(
    backend: &dyn Backend,
    settings: &BackendSettings,
) -> SetupResult<Established> {
    let topology = settings.resolve()?;
    info!(
        kind = %topology.kind(),
        endpoints = topology.endpoints().len(),
        "backend topology resolved"
    );

    let handle = Arc::new(build_with(backend, &topology).await?);
    let commands = Arc::new(CommandSurface::new(&handle));

    let lifecycle = Arc::new(LifecycleManager::new());
    lifecycle.register(handle)?;

    Ok(Established {
        commands,
        lifecycle,
    })
}
