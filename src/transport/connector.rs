//! Stream establishment.
//!
//! The client never opens sockets directly; it asks a [`Connector`] for a
//! split byte stream. [`TcpConnector`] is the production implementation,
//! tests plug in in-memory streams.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Boxed future returned by [`Connector::connect`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read half of an established stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an established stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens byte streams to remote addresses.
pub trait Connector: Send + Sync + 'static {
    /// Connect to `addr` and return the stream split into halves.
    fn connect(&self, addr: SocketAddr) -> BoxFuture<'_, io::Result<(BoxedReader, BoxedWriter)>>;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    /// Connector with `TCP_NODELAY` enabled.
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    /// Enable or disable `TCP_NODELAY`.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for TcpConnector {
    fn connect(&self, addr: SocketAddr) -> BoxFuture<'_, io::Result<(BoxedReader, BoxedWriter)>> {
        Box::pin(async move {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(self.nodelay)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
        })
    }
}
