//! Backend connection settings.
//!
//! Settings arrive either as a JSON document or through `KVLINK_*`
//! environment variables. `is_cluster` is a real boolean here, so the
//! topology branch later is a plain `match`.

use serde::Deserialize;
use thiserror::Error;

use crate::credential::Credential;
use crate::endpoint;
use crate::error::SetupResult;
use crate::topology::{self, Topology};

/// Default connect/command timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Environment variable names.
pub mod vars {
    pub const HOST: &str = "KVLINK_HOST";
    pub const TIMEOUT: &str = "KVLINK_TIMEOUT";
    pub const PASSWORD: &str = "KVLINK_PASSWORD";
    pub const IS_CLUSTER: &str = "KVLINK_IS_CLUSTER";
}

/// Settings loading errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("required environment variable not set: {var}")]
    NotSet { var: String },

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Raw backend settings as configured.
///
/// Input only. The password would serialize as `[REDACTED]`, so settings are
/// never written back out.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendSettings {
    /// Comma-separated `host[:port]` list.
    pub host: String,
    /// Connect/command timeout in milliseconds.
    #[serde(default = "default_timeout", alias = "timeout_ms")]
    pub timeout: u64,
    /// Optional backend password.
    #[serde(default)]
    pub password: Option<Credential>,
    /// Cluster mode flag.
    #[serde(default, alias = "isCluster")]
    pub is_cluster: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl BackendSettings {
    pub fn new(host: impl Into<String>) -> Self {
        BackendSettings {
            host: host.into(),
            timeout: DEFAULT_TIMEOUT_MS,
            password: None,
            is_cluster: false,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = timeout_ms;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Credential::new(password));
        self
    }

    pub fn cluster(mut self, is_cluster: bool) -> Self {
        self.is_cluster = is_cluster;
        self
    }

    /// Parses settings from a JSON document.
    pub fn from_json(input: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    ///
    /// Variables that are set but empty count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.is_empty());

        let host = get(vars::HOST).ok_or_else(|| SettingsError::NotSet {
            var: vars::HOST.to_string(),
        })?;

        let timeout = match get(vars::TIMEOUT) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| SettingsError::InvalidValue {
                    var: vars::TIMEOUT.to_string(),
                    message: e.to_string(),
                })?,
            None => DEFAULT_TIMEOUT_MS,
        };

        let is_cluster = match get(vars::IS_CLUSTER) {
            Some(raw) => parse_bool(vars::IS_CLUSTER, &raw)?,
            None => false,
        };

        Ok(BackendSettings {
            host,
            timeout,
            password: get(vars::PASSWORD).map(Credential::new),
            is_cluster,
        })
    }

    /// Parses the host list and selects the topology. Performs no I/O.
    pub fn resolve(&self) -> SetupResult<Topology> {
        let spec = endpoint::parse(&self.host, self.password.clone(), self.timeout)?;
        topology::select(spec, self.is_cluster)
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, SettingsError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(SettingsError::InvalidValue {
            var: var.to_string(),
            message: format!("expected `true` or `false`, got `{}`", other),
        }),
    }
}
