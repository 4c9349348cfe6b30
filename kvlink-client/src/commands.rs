//! # Command Surface
//!
//! Purpose: Expose a compact async string API over whichever connection the
//! builder produced, so callers never see the topology.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `CommandSurface` hides routing and protocol details.
//! 2. **Pass-Through**: One call is one backend command; no retries, no
//!    serialization.
//! 3. **Fail Fast**: Reply types that do not match the command surface as
//!    errors immediately.

use std::sync::Arc;
use std::time::Duration;

use kvlink_common::{CommandError, CommandResult, TopologyKind};

use crate::backend::BackendConnection;
use crate::handle::ConnectionHandle;
use crate::resp::RespValue;

/// Topology-agnostic get/set interface.
///
/// Shared between tasks through `Arc`; every method takes `&self`.
pub struct CommandSurface {
    connection: Arc<dyn BackendConnection>,
    kind: TopologyKind,
}

impl CommandSurface {
    pub fn new(handle: &ConnectionHandle) -> Self {
        CommandSurface {
            connection: handle.connection(),
            kind: handle.kind(),
        }
    }

    /// Topology behind the surface, for diagnostics only.
    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    /// Fetches a value. A missing key is [`CommandError::NotFound`].
    pub async fn get(&self, key: &str) -> CommandResult<String> {
        match self.connection.execute(&[b"GET", key.as_bytes()]).await? {
            RespValue::Bulk(Some(data)) => into_string(data),
            RespValue::Bulk(None) => Err(CommandError::NotFound),
            other => Err(unexpected(other)),
        }
    }

    /// Stores a value without expiration.
    pub async fn set(&self, key: &str, value: &str) -> CommandResult<()> {
        match self
            .connection
            .execute(&[b"SET", key.as_bytes(), value.as_bytes()])
            .await?
        {
            RespValue::Simple(_) => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Stores a value with an expiration, sent as `EX` for whole seconds and
    /// `PX` otherwise. The backend validates the duration.
    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CommandResult<()> {
        let (unit, amount): (&[u8], u64) = if ttl.subsec_millis() == 0 {
            (&b"EX"[..], ttl.as_secs())
        } else {
            (&b"PX"[..], ttl.as_millis().min(u64::MAX as u128) as u64)
        };
        let (digits, len) = encode_u64(amount);
        match self
            .connection
            .execute(&[b"SET", key.as_bytes(), value.as_bytes(), unit, &digits[..len]])
            .await?
        {
            RespValue::Simple(_) => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Deletes a key. Returns true when a key was removed.
    pub async fn delete(&self, key: &str) -> CommandResult<bool> {
        match self.connection.execute(&[b"DEL", key.as_bytes()]).await? {
            RespValue::Integer(count) => Ok(count > 0),
            other => Err(unexpected(other)),
        }
    }

    /// Pings the backend and returns its reply text.
    pub async fn ping(&self) -> CommandResult<String> {
        match self.connection.execute(&[b"PING"]).await? {
            RespValue::Simple(text) | RespValue::Bulk(Some(text)) => into_string(text),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(reply: RespValue) -> CommandError {
    match reply.error_message() {
        Some(message) => CommandError::Server { message },
        None => CommandError::UnexpectedResponse,
    }
}

fn into_string(data: Vec<u8>) -> CommandResult<String> {
    String::from_utf8(data).map_err(|_| CommandError::Protocol("reply is not valid UTF-8"))
}

fn encode_u64(mut value: u64) -> ([u8; 20], usize) {
    // Stack buffer keeps conversion allocation-free.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        return (buf, 1);
    }
    while value > 0 {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
    }
    buf[..len].reverse();
    (buf, len)
}
