//! # Error Types
//!
//! Purpose: Separate startup failures, which abort the process, from
//! per-command failures, which are handed back to the caller.
//!
//! ## Design Principles
//! 1. **Typed Taxonomy**: Each rejection path has its own variant so callers
//!    and tests can match on the kind instead of parsing messages.
//! 2. **Fail Fast**: Configuration problems surface before any socket opens.
//! 3. **No Secrets**: Messages carry endpoints and reasons, never credentials.

use std::time::Duration;

use thiserror::Error;

/// Result type for parsing, selection, and build steps.
pub type SetupResult<T> = Result<T, SetupError>;

/// Result type for commands issued through the command surface.
pub type CommandResult<T> = Result<T, CommandError>;

/// Startup failures. Every variant is fatal to bootstrap.
#[derive(Debug, Error)]
pub enum SetupError {
    /// A host entry is missing or malformed.
    #[error("invalid endpoint `{entry}`: {reason}")]
    InvalidEndpoint { entry: String, reason: &'static str },

    /// A port segment is not a number in 0..=65535.
    #[error("invalid port `{port}` in endpoint `{entry}`")]
    InvalidPort { entry: String, port: String },

    /// Settings are contradictory or incomplete.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Network or authentication failure while opening the connection.
    #[error("connection to {target} failed: {source}")]
    Connection {
        target: String,
        #[source]
        source: CommandError,
    },

    /// Builder failure not covered by the other kinds.
    #[error("build error: {message}")]
    Build { message: String },
}

impl SetupError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SetupError::Configuration {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        SetupError::Build {
            message: message.into(),
        }
    }
}

/// Per-call failures returned by the command surface.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The key does not exist.
    #[error("key not found")]
    NotFound,

    /// Socket read/write failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The exchange did not complete within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// RESP2 framing violation.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// The backend answered with an error reply.
    #[error("server error: {message}")]
    Server { message: String },

    /// Reply type did not match the command.
    #[error("unexpected response")]
    UnexpectedResponse,

    /// Cluster redirects did not settle on an owning node.
    #[error("too many cluster redirects ({redirects})")]
    Redirect { redirects: usize },

    /// The connection was closed by the lifecycle manager.
    #[error("connection closed")]
    Closed,
}

impl CommandError {
    /// Returns true when the backend rejected the command itself rather than
    /// the transport failing.
    pub fn is_server_reply(&self) -> bool {
        matches!(self, CommandError::Server { .. })
    }

    /// Returns true when the socket can no longer be trusted to be in sync
    /// with the backend and must be discarded.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CommandError::Io(_) | CommandError::Timeout(_) | CommandError::Protocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_keeps_source() {
        let err = SetupError::Connection {
            target: "127.0.0.1:6379".to_string(),
            source: CommandError::Timeout(Duration::from_millis(5)),
        };
        assert!(err.to_string().contains("127.0.0.1:6379"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_port_message_names_entry() {
        let err = SetupError::InvalidPort {
            entry: "a:xx".to_string(),
            port: "xx".to_string(),
        };
        assert_eq!(err.to_string(), "invalid port `xx` in endpoint `a:xx`");
    }
}
