//! # Node Connection
//!
//! Purpose: One TCP connection to one backend node, with authentication,
//! timeouts, and reusable buffers.
//!
//! ## Design Principles
//! 1. **Buffer Reuse**: Each connection owns its read and write buffers.
//! 2. **Bounded Exchanges**: Connect and every request/reply exchange run
//!    under the configured timeout.
//! 3. **Discard on Transport Failure**: A socket that failed mid-exchange may
//!    hold half a reply, so `NodeLink` drops it and dials afresh next time.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use kvlink_common::{CommandError, CommandResult};

use crate::backend::NodeOptions;
use crate::resp::{encode_command, ReplyDecoder, RespValue};

/// Single authenticated TCP connection.
pub(crate) struct NodeConnection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decoder: ReplyDecoder,
    options: NodeOptions,
}

impl NodeConnection {
    /// Dials the node and authenticates when a credential is configured.
    pub(crate) async fn open(options: &NodeOptions) -> CommandResult<Self> {
        let address = options.address();
        let stream = timeout(options.timeout, TcpStream::connect(address.as_str()))
            .await
            .map_err(|_| CommandError::Timeout(options.timeout))??;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = NodeConnection {
            stream,
            read_buf: BytesMut::with_capacity(4 * 1024),
            write_buf: BytesMut::with_capacity(256),
            decoder: ReplyDecoder::default(),
            options: options.clone(),
        };

        if let Some(credential) = &options.credential {
            let reply = conn.exec(&[b"AUTH", credential.expose().as_bytes()]).await?;
            match reply {
                RespValue::Simple(_) => debug!(node = %address, "authenticated"),
                RespValue::Error(_) => {
                    return Err(CommandError::Server {
                        message: reply.error_message().unwrap_or_default(),
                    })
                }
                _ => return Err(CommandError::UnexpectedResponse),
            }
        }

        debug!(node = %address, "node connection established");
        Ok(conn)
    }

    pub(crate) fn options(&self) -> &NodeOptions {
        &self.options
    }

    /// Sends one command and waits for its reply under the node timeout.
    pub(crate) async fn exec(&mut self, args: &[&[u8]]) -> CommandResult<RespValue> {
        let limit = self.options.timeout;
        timeout(limit, self.exchange(args))
            .await
            .map_err(|_| CommandError::Timeout(limit))?
    }

    async fn exchange(&mut self, args: &[&[u8]]) -> CommandResult<RespValue> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        loop {
            if let Some(value) = self.decoder.decode(&mut self.read_buf)? {
                return Ok(value);
            }
            let read = self.stream.read_buf(&mut self.read_buf).await?;
            if read == 0 {
                return Err(CommandError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "backend closed the connection",
                )));
            }
        }
    }

    pub(crate) async fn shutdown(mut self) {
        if let Err(err) = self.stream.shutdown().await {
            debug!(node = %self.options.address(), error = %err, "socket shutdown failed");
        }
    }
}

/// A node slot that holds at most one live connection and redials lazily
/// after a transport failure.
pub(crate) struct NodeLink {
    options: NodeOptions,
    conn: Mutex<Option<NodeConnection>>,
    closed: AtomicBool,
}

impl NodeLink {
    pub(crate) fn new(options: NodeOptions) -> Self {
        NodeLink {
            options,
            conn: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_connection(conn: NodeConnection) -> Self {
        NodeLink {
            options: conn.options().clone(),
            conn: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn options(&self) -> &NodeOptions {
        &self.options
    }

    /// Executes a command. With `asking`, an `ASKING` is sent first on the
    /// same socket while the link stays locked.
    pub(crate) async fn exec(&self, args: &[&[u8]], asking: bool) -> CommandResult<RespValue> {
        let mut guard = self.conn.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(CommandError::Closed);
        }
        if guard.is_none() {
            *guard = Some(NodeConnection::open(&self.options).await?);
        }
        let conn = guard.as_mut().ok_or(CommandError::Closed)?;

        let result = if asking {
            match conn.exec(&[b"ASKING"]).await {
                Ok(RespValue::Error(message)) => Err(CommandError::Server {
                    message: String::from_utf8_lossy(&message).into_owned(),
                }),
                Ok(_) => conn.exec(args).await,
                Err(err) => Err(err),
            }
        } else {
            conn.exec(args).await
        };

        if let Err(err) = &result {
            if err.is_transport() {
                debug!(node = %self.options.address(), error = %err, "discarding node connection");
                *guard = None;
            }
        }
        result
    }

    /// Closes the link for good; later `exec` calls fail with `Closed`.
    pub(crate) async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.shutdown().await;
        }
    }
}
