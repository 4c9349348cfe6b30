// kvlink-common - Configuration, endpoint, and topology types for kvlink
//
// Everything in this crate is pure: no sockets, no runtime.

pub mod credential;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod settings;
pub mod topology;

// Re-export for convenience
pub use credential::Credential;
pub use endpoint::{parse, Endpoint, EndpointSpec, DEFAULT_PORT};
pub use error::*;
pub use settings::{BackendSettings, SettingsError};
pub use topology::{select, Topology, TopologyKind};
