//! Dedicated writer task for one connection.
//!
//! Callers hand pre-encoded frames to the task through an mpsc channel, so
//! every frame reaches the socket as one unit and frames from concurrent
//! callers never interleave. The task also owns the write-idle timer: when
//! nothing has been written for the heartbeat interval it writes a
//! heartbeat frame itself.
//!
//! # Architecture
//!
//! ```text
//! send() 1 ─┐
//! send() 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! send() N ─┘                                     ▲
//!                              write-idle timer ──┘
//! ```
//!
//! A failed write ends the task with an error; the owner closes the
//! connection in response.

use std::io::IoSlice;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::{Result, RpcError};
use crate::transport::{ConnectionState, StateCell};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Completion signal for a single frame write.
pub type WriteAck = oneshot::Receiver<Result<()>>;

/// A frame ready to be written to the socket.
#[derive(Debug)]
struct OutboundFrame {
    /// Complete encoded frame (header + body).
    bytes: Bytes,
    /// Notified once the frame is flushed or the write fails.
    ack: Option<oneshot::Sender<Result<()>>>,
}

impl OutboundFrame {
    fn with_ack(bytes: Bytes) -> (Self, WriteAck) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                bytes,
                ack: Some(tx),
            },
            rx,
        )
    }

    #[inline]
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn complete(self, result: Result<()>) {
        if let Some(ack) = self.ack {
            let _ = ack.send(result);
        }
    }
}

/// Heartbeat emitted on write-idle.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    /// Write-idle window.
    pub interval: Duration,
    /// Pre-encoded HEARTBEAT_REQUEST frame.
    pub frame: Bytes,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
    /// Write-idle heartbeat, disabled when `None`.
    pub heartbeat: Option<Heartbeat>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            heartbeat: None,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame and return the receiver of its write completion.
    ///
    /// Waits only for channel capacity, not for the write itself.
    pub async fn write(&self, bytes: Bytes) -> Result<WriteAck> {
        let (frame, ack) = OutboundFrame::with_ack(bytes);
        self.tx
            .send(frame)
            .await
            .map_err(|_| RpcError::ConnectionClosed)?;
        Ok(ack)
    }
}

/// Receiving side of the writer, driven by [`WriterTask::run`].
pub struct WriterTask {
    rx: mpsc::Receiver<OutboundFrame>,
    heartbeat: Option<Heartbeat>,
}

/// Create a connected handle/task pair; the owner spawns [`WriterTask::run`].
pub fn writer_channel(config: WriterConfig) -> (WriterHandle, WriterTask) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));

    let task = WriterTask {
        rx,
        heartbeat: config.heartbeat,
    };

    (WriterHandle { tx }, task)
}

impl WriterTask {
    /// Main writer loop: batches queued frames and emits heartbeats.
    ///
    /// Returns `Ok(())` when every handle is dropped, or the first write
    /// error. Frames still queued at that point are failed.
    pub async fn run<W>(mut self, mut writer: W, state: Arc<StateCell>) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let result = self.write_loop(&mut writer, &state).await;

        if let Err(e) = &result {
            self.rx.close();
            while let Ok(frame) = self.rx.try_recv() {
                frame.complete(Err(RpcError::Connection(e.to_string())));
            }
        }

        result
    }

    async fn write_loop<W>(&mut self, writer: &mut W, state: &StateCell) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut last_write = Instant::now();

        loop {
            let first = match &self.heartbeat {
                Some(heartbeat) => {
                    let deadline = last_write + heartbeat.interval;
                    tokio::select! {
                        biased;
                        frame = self.rx.recv() => frame,
                        _ = tokio::time::sleep_until(deadline) => {
                            tracing::debug!("Write idle for {:?}, sending heartbeat", heartbeat.interval);
                            write_all_flush(writer, &heartbeat.frame).await.map_err(|e| {
                                tracing::warn!("Heartbeat write failed: {}", e);
                                RpcError::Connection(format!("heartbeat write failed: {}", e))
                            })?;
                            state.set(ConnectionState::Idle);
                            last_write = Instant::now();
                            continue;
                        }
                    }
                }
                None => self.rx.recv().await,
            };

            let first = match first {
                Some(f) => f,
                None => return Ok(()),
            };

            let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
            batch.push(first);

            while batch.len() < MAX_BATCH_SIZE {
                match self.rx.try_recv() {
                    Ok(frame) => batch.push(frame),
                    Err(_) => break,
                }
            }

            let batch_size = batch.len();
            let result = write_batch(writer, &batch).await;

            match result {
                Ok(()) => {
                    last_write = Instant::now();
                    state.set(ConnectionState::Connected);
                    for frame in batch {
                        frame.complete(Ok(()));
                    }
                }
                Err(e) => {
                    tracing::warn!("Write of {} frame(s) failed: {}", batch_size, e);
                    let reason = format!("write failed: {}", e);
                    for frame in batch {
                        frame.complete(Err(RpcError::Connection(reason.clone())));
                    }
                    return Err(RpcError::Connection(reason));
                }
            }
        }
    }
}

async fn write_all_flush<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after `skip_bytes` were written.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.size();
        if skip_bytes < end && !frame.bytes.is_empty() {
            let start_in_frame = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.bytes[start_in_frame..]));
        }
        offset = end;
    }

    slices
}
