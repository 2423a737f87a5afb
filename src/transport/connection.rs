//! Connection Handle.
//!
//! A [`Connection`] owns one established byte stream and runs two tasks on
//! it: a reader that turns bytes into [`RpcMessage`]s for a
//! [`MessageHandler`], and the writer task from [`crate::writer`].
//!
//! Either task failing closes the connection. Closing is idempotent, aborts
//! both tasks (dropping the stream halves) and wakes every
//! [`Connection::closed`] waiter.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use super::state::{ConnectionState, StateCell};
use crate::codec::ids;
use crate::error::{Result, RpcError};
use crate::protocol::{MessageCodec, MessageDecoder, RpcMessage};
use crate::writer::{writer_channel, Heartbeat, WriteAck, WriterConfig, WriterHandle};

/// Default reader scratch buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Receives every message decoded on a connection.
pub trait MessageHandler: Send + Sync + 'static {
    /// Called from the reader task, in arrival order. Must not block.
    fn on_message(&self, connection: &Connection, message: RpcMessage);
}

/// Per-connection tuning.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Writer queue depth.
    pub channel_capacity: usize,
    /// Reader scratch buffer size.
    pub read_buffer_size: usize,
    /// Write-idle window, heartbeats disabled when `None`.
    pub heartbeat_interval: Option<Duration>,
    /// Codec id stamped on heartbeat frames.
    pub heartbeat_codec: u8,
    /// Compress id stamped on heartbeat frames.
    pub heartbeat_compress: u8,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            channel_capacity: crate::writer::DEFAULT_CHANNEL_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            heartbeat_interval: None,
            heartbeat_codec: ids::MSGPACK,
            heartbeat_compress: ids::NO_COMPRESSION,
        }
    }
}

struct Inner {
    id: u64,
    remote: SocketAddr,
    state: Arc<StateCell>,
    writer: WriterHandle,
    closed_tx: watch::Sender<bool>,
    close_reason: Mutex<Option<String>>,
    tasks: Mutex<Vec<AbortHandle>>,
}

/// Cloneable handle to one live (or closed) stream.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("remote", &self.inner.remote)
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    /// Start the reader and writer tasks on an established stream.
    ///
    /// Must be called inside a tokio runtime. Fails only if the heartbeat
    /// frame cannot be encoded.
    pub fn spawn<R, W>(
        remote: SocketAddr,
        reader: R,
        writer: W,
        codec: MessageCodec,
        handler: Arc<dyn MessageHandler>,
        options: ConnectionOptions,
    ) -> Result<Connection>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let heartbeat = match options.heartbeat_interval {
            Some(interval) => {
                let ping = RpcMessage::ping(options.heartbeat_codec, options.heartbeat_compress);
                Some(Heartbeat {
                    interval,
                    frame: codec.encode(&ping)?,
                })
            }
            None => None,
        };

        let state = Arc::new(StateCell::new(ConnectionState::Connecting));
        let (writer_handle, writer_task) = writer_channel(WriterConfig {
            channel_capacity: options.channel_capacity,
            heartbeat,
        });
        let (closed_tx, _) = watch::channel(false);

        let connection = Connection {
            inner: Arc::new(Inner {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                remote,
                state: state.clone(),
                writer: writer_handle,
                closed_tx,
                close_reason: Mutex::new(None),
                tasks: Mutex::new(Vec::with_capacity(2)),
            }),
        };

        let conn = connection.clone();
        let write = tokio::spawn(async move {
            if let Err(e) = writer_task.run(writer, state).await {
                conn.close(e.to_string());
            }
        });
        connection.track(write.abort_handle());

        let conn = connection.clone();
        let read_buffer_size = options.read_buffer_size.max(1);
        let read = tokio::spawn(async move {
            match read_loop(reader, &conn, codec, handler, read_buffer_size).await {
                Ok(()) => conn.close("closed by peer"),
                Err(e) => {
                    if matches!(e, RpcError::Protocol(_)) {
                        tracing::error!("Protocol error on connection {}: {}", conn.id(), e);
                    }
                    conn.close(e.to_string());
                }
            }
        });
        connection.track(read.abort_handle());

        connection.inner.state.set(ConnectionState::Connected);
        tracing::info!("Connection {} established to {}", connection.id(), remote);

        Ok(connection)
    }

    fn track(&self, task: AbortHandle) {
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            if self.inner.state.get() == ConnectionState::Closed {
                task.abort();
            } else {
                tasks.push(task);
            }
        }
    }

    /// Process-unique connection id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Remote address.
    #[inline]
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Whether requests may be written.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Queue an encoded frame and return its write completion.
    ///
    /// Fails immediately if the connection is not active.
    pub async fn send(&self, frame: Bytes) -> Result<WriteAck> {
        self.ensure_active()?;
        self.inner.writer.write(frame).await
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(RpcError::Connection(format!(
                "connection {} to {} is {}",
                self.inner.id,
                self.inner.remote,
                self.state()
            )))
        }
    }

    /// Note inbound traffic; an idle connection becomes connected again.
    fn mark_alive(&self) {
        if self.state() == ConnectionState::Idle {
            self.inner.state.set(ConnectionState::Connected);
        }
    }

    /// Close the connection. Only the first call has any effect.
    pub fn close(&self, reason: impl Into<String>) {
        if !self.inner.state.close() {
            return;
        }

        let reason = reason.into();
        tracing::info!(
            "Connection {} to {} closed: {}",
            self.inner.id,
            self.inner.remote,
            reason
        );

        if let Ok(mut slot) = self.inner.close_reason.lock() {
            *slot = Some(reason);
        }
        self.inner.closed_tx.send_replace(true);

        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    /// Why the connection was closed, once it is.
    pub fn close_reason(&self) -> Option<String> {
        self.inner
            .close_reason
            .lock()
            .ok()
            .and_then(|reason| reason.clone())
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

async fn read_loop<R>(
    mut reader: R,
    connection: &Connection,
    codec: MessageCodec,
    handler: Arc<dyn MessageHandler>,
    read_buffer_size: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = MessageDecoder::new(codec);
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        decoder.feed(&buf[..n]);
        while let Some(message) = decoder.next_message()? {
            connection.mark_alive();
            handler.on_message(connection, message);
        }
    }
}
