//! # Endpoint Parsing
//!
//! Purpose: Turn the configured `host[:port],host[:port]` string into an
//! ordered, validated endpoint list before any network work happens.
//!
//! ## Design Principles
//! 1. **Pure Transformation**: No DNS lookups or sockets; only text checks.
//! 2. **Order Preservation**: Entry order is kept because cluster seeds are
//!    contacted in the order they were configured.
//! 3. **Typed Rejection**: Bad hosts and bad ports map to distinct errors.
//!
//! ## Grammar
//!
//! ```text
//! host_config := entry ("," entry)*
//! entry       := host [":" port]
//! port        := digit+            (0..=65535)
//! ```
//!
//! Only the first `:` separates host from port, so `a:1:2` carries the port
//! segment `1:2` and is rejected.

use std::fmt;
use std::time::Duration;

use crate::credential::Credential;
use crate::error::{SetupError, SetupResult};

/// Port used when an entry does not name one.
pub const DEFAULT_PORT: u16 = 6379;

/// One configured backend node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    has_explicit_port: bool,
}

impl Endpoint {
    /// Endpoint with an explicit port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
            has_explicit_port: true,
        }
    }

    /// Endpoint whose port was left out of the configuration.
    ///
    /// The stored port is `0`, meaning "unset"; see [`Endpoint::resolved_port`].
    pub fn without_port(host: impl Into<String>) -> Self {
        Endpoint {
            host: host.into(),
            port: 0,
            has_explicit_port: false,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port as configured, `0` when absent.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn has_explicit_port(&self) -> bool {
        self.has_explicit_port
    }

    /// Port to dial: the configured one, or [`DEFAULT_PORT`] when unset.
    pub fn resolved_port(&self) -> u16 {
        if self.has_explicit_port {
            self.port
        } else {
            DEFAULT_PORT
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_explicit_port {
            write!(f, "{}:{}", self.host, self.port)
        } else {
            write!(f, "{}", self.host)
        }
    }
}

/// Validated endpoint list plus the settings applied to every node.
///
/// Invariant: `endpoints` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    endpoints: Vec<Endpoint>,
    credential: Option<Credential>,
    timeout: Duration,
}

impl EndpointSpec {
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false for a parsed spec; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Connect and command timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Parses a host list into an [`EndpointSpec`].
///
/// Entries are trimmed of surrounding whitespace. Empty input, empty entries,
/// and empty hosts fail with [`SetupError::InvalidEndpoint`]; a port segment
/// that is not all digits or exceeds 65535 fails with [`SetupError::InvalidPort`];
/// a zero timeout fails with [`SetupError::Configuration`].
pub fn parse(
    host_config: &str,
    credential: Option<Credential>,
    timeout_ms: u64,
) -> SetupResult<EndpointSpec> {
    if host_config.trim().is_empty() {
        return Err(SetupError::InvalidEndpoint {
            entry: host_config.to_string(),
            reason: "host list is empty",
        });
    }
    if timeout_ms == 0 {
        return Err(SetupError::configuration("timeout must be greater than zero"));
    }

    let endpoints = host_config
        .split(',')
        .map(parse_entry)
        .collect::<SetupResult<Vec<_>>>()?;

    Ok(EndpointSpec {
        endpoints,
        credential,
        timeout: Duration::from_millis(timeout_ms),
    })
}

fn parse_entry(raw: &str) -> SetupResult<Endpoint> {
    let entry = raw.trim();
    if entry.is_empty() {
        return Err(SetupError::InvalidEndpoint {
            entry: raw.to_string(),
            reason: "empty entry",
        });
    }

    let (host, port) = match entry.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (entry, None),
    };

    if host.is_empty() {
        return Err(SetupError::InvalidEndpoint {
            entry: entry.to_string(),
            reason: "missing host",
        });
    }
    if host.chars().any(char::is_whitespace) {
        return Err(SetupError::InvalidEndpoint {
            entry: entry.to_string(),
            reason: "host contains whitespace",
        });
    }

    match port {
        Some(port) => Ok(Endpoint::new(host, parse_port(entry, port)?)),
        None => Ok(Endpoint::without_port(host)),
    }
}

fn parse_port(entry: &str, segment: &str) -> SetupResult<u16> {
    let invalid = || SetupError::InvalidPort {
        entry: entry.to_string(),
        port: segment.to_string(),
    };
    // `u16::from_str` accepts a leading '+', so check digits first.
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    segment.parse::<u16>().map_err(|_| invalid())
}
