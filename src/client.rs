//! Client Transport Engine.
//!
//! [`RpcClient::send`] turns a request into a frame on the right connection
//! and hands back a [`ResponseHandle`] without waiting for the reply:
//!
//! 1. Resolve the service name to an address (`UnresolvedService` if none)
//! 2. Reuse or establish the connection under the connect timeout
//! 3. Refuse inactive connections
//! 4. Register the pending entry, then queue the frame
//! 5. If the write fails, close the connection, fail the entry with the
//!    cause and drop the registry entry
//!
//! Responses are routed back by request id from the connection's reader
//! task. Timeouts, connection loss and [`RpcClient::shutdown`] all fail the
//! pending entry instead.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::AbortHandle;

use crate::codec::{CodecRegistry, Compressor, Serializer};
use crate::config::ClientConfig;
use crate::discovery::ServiceDiscovery;
use crate::error::{Result, RpcError};
use crate::pending::{PendingRequests, ResponseSlot};
use crate::protocol::{
    MessageBody, MessageCodec, MessageType, ResponseCode, RpcMessage, RpcRequest, RpcResponse,
};
use crate::transport::{
    Connection, ConnectionOptions, ConnectionRegistry, Connector, MessageHandler, TcpConnector,
};

/// Builder for configuring an [`RpcClient`].
pub struct ClientBuilder {
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    connector: Arc<dyn Connector>,
    codecs: CodecRegistry,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder with default config, TCP transport and the built-in codecs.
    pub fn new() -> Self {
        Self {
            discovery: None,
            connector: Arc::new(TcpConnector::new()),
            codecs: CodecRegistry::with_defaults(),
            config: ClientConfig::default(),
        }
    }

    /// Set the address resolver. Required.
    pub fn discovery<D: ServiceDiscovery>(mut self, discovery: D) -> Self {
        self.discovery = Some(Arc::new(discovery));
        self
    }

    /// Set an already shared address resolver.
    pub fn shared_discovery(mut self, discovery: Arc<dyn ServiceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Replace the stream connector.
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Add or replace a serializer.
    pub fn register_serializer<S: Serializer>(mut self, serializer: S) -> Self {
        self.codecs.register_serializer(Arc::new(serializer));
        self
    }

    /// Add or replace a compressor.
    pub fn register_compressor<C: Compressor>(mut self, compressor: C) -> Self {
        self.codecs.register_compressor(Arc::new(compressor));
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the per-request timeout, `None` to wait forever.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the write-idle window before a heartbeat is sent.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the max frame length (header included).
    pub fn max_frame_length(mut self, length: u32) -> Self {
        self.config.max_frame_length = length;
        self
    }

    /// Select the codec id for outgoing requests.
    pub fn serializer(mut self, id: u8) -> Self {
        self.config.serializer = id;
        self
    }

    /// Select the compress id for outgoing requests.
    pub fn compressor(mut self, id: u8) -> Self {
        self.config.compressor = id;
        self
    }

    /// Set the writer queue depth per connection.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> Result<RpcClient> {
        self.config.validate()?;

        let discovery = self
            .discovery
            .ok_or_else(|| RpcError::Config("no service discovery configured".into()))?;

        self.codecs.serializer(self.config.serializer).map_err(|_| {
            RpcError::Config(format!("unknown serializer id {}", self.config.serializer))
        })?;
        self.codecs.compressor(self.config.compressor).map_err(|_| {
            RpcError::Config(format!("unknown compressor id {}", self.config.compressor))
        })?;

        let codec = MessageCodec::new(Arc::new(self.codecs))
            .with_max_frame_length(self.config.max_frame_length);
        let pending = Arc::new(PendingRequests::new());
        let router = Arc::new(ResponseRouter {
            pending: pending.clone(),
        });

        Ok(RpcClient {
            inner: Arc::new(ClientInner {
                discovery,
                connector: self.connector,
                codec,
                config: self.config,
                connections: Arc::new(ConnectionRegistry::new()),
                pending,
                router,
                next_request_id: AtomicU32::new(1),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ClientInner {
    discovery: Arc<dyn ServiceDiscovery>,
    connector: Arc<dyn Connector>,
    codec: MessageCodec,
    config: ClientConfig,
    connections: Arc<ConnectionRegistry>,
    pending: Arc<PendingRequests>,
    router: Arc<ResponseRouter>,
    next_request_id: AtomicU32,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.connections.close_all("client dropped");
    }
}

/// Cloneable RPC client. Clones share connections and pending requests.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl RpcClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Send a request and return a handle to its eventual response.
    ///
    /// The request id is assigned here and overwrites `request.request_id`.
    ///
    /// # Errors
    ///
    /// Returned directly: resolution, connect and encode failures, or an
    /// inactive connection. A failure while writing the frame is delivered
    /// through the handle instead.
    pub async fn send(&self, mut request: RpcRequest) -> Result<ResponseHandle> {
        let inner = &self.inner;

        let service = request.service_name();
        let addr = inner
            .discovery
            .lookup(&service)
            .ok_or(RpcError::UnresolvedService(service))?;

        let connection = self.connection_for(addr).await?;
        if !connection.is_active() {
            return Err(RpcError::Connection(format!(
                "connection to {} is {}",
                addr,
                connection.state()
            )));
        }

        let request_id = self.next_request_id();
        request.request_id = request_id;
        let message = RpcMessage::request(request, inner.config.serializer, inner.config.compressor);
        let frame = inner.codec.encode(&message)?;

        let slot = inner.pending.register(request_id, connection.id())?;
        let timer = inner.config.request_timeout.map(|timeout| {
            let pending = inner.pending.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if pending.fail(request_id, RpcError::Timeout { request_id, timeout }) {
                    tracing::debug!("Request {} timed out after {:?}", request_id, timeout);
                }
            })
            .abort_handle()
        });
        let handle = ResponseHandle::new(request_id, slot, timer);

        match connection.send(frame).await {
            Ok(ack) => {
                let pending = inner.pending.clone();
                let connections = inner.connections.clone();
                tokio::spawn(async move {
                    let outcome = ack.await.unwrap_or(Err(RpcError::ConnectionClosed));
                    if let Err(e) = outcome {
                        abandon_write(&pending, &connections, &connection, addr, request_id, e);
                    }
                });
            }
            Err(e) => abandon_write(
                &inner.pending,
                &inner.connections,
                &connection,
                addr,
                request_id,
                e,
            ),
        }

        Ok(handle)
    }

    /// Send a request and wait for its response.
    pub async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        self.send(request).await?.await
    }

    /// Close every connection and fail every pending request.
    pub fn shutdown(&self) {
        let closed = self.inner.connections.close_all("client shutdown");
        let failed = self.inner.pending.fail_all(|| RpcError::ConnectionClosed);
        tracing::info!(
            "Client shut down: {} connection(s) closed, {} request(s) failed",
            closed,
            failed
        );
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Next free request id. Never 0, never an id still outstanding.
    fn next_request_id(&self) -> u32 {
        loop {
            let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 && !self.inner.pending.contains(id) {
                return id;
            }
        }
    }

    async fn connection_for(&self, addr: SocketAddr) -> Result<Connection> {
        let inner = &self.inner;
        let timeout = inner.config.connect_timeout;

        let attempt = inner
            .connections
            .get_or_connect(addr, || inner.open(addr));

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Connection(format!(
                "connect to {} timed out after {:?}",
                addr, timeout
            ))),
        }
    }
}

impl ClientInner {
    async fn open(&self, addr: SocketAddr) -> Result<Connection> {
        let (reader, writer) = self
            .connector
            .connect(addr)
            .await
            .map_err(|e| RpcError::Connection(format!("connect to {} failed: {}", addr, e)))?;

        let options = ConnectionOptions {
            channel_capacity: self.config.channel_capacity,
            read_buffer_size: self.config.read_buffer_size,
            heartbeat_interval: Some(self.config.heartbeat_interval),
            heartbeat_codec: self.config.serializer,
            heartbeat_compress: self.config.compressor,
        };
        let router: Arc<dyn MessageHandler> = self.router.clone();
        let connection =
            Connection::spawn(addr, reader, writer, self.codec.clone(), router, options)?;

        let watched = connection.clone();
        let connections = self.connections.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            watched.closed().await;
            connections.remove_if(&addr, watched.id());

            let reason = watched
                .close_reason()
                .unwrap_or_else(|| "closed".to_string());
            let failed = pending.fail_connection(watched.id(), || {
                RpcError::Connection(format!("connection to {} lost: {}", addr, reason))
            });
            if failed > 0 {
                tracing::debug!(
                    "Failed {} pending request(s) on connection {}",
                    failed,
                    watched.id()
                );
            }
        });

        Ok(connection)
    }
}

/// Write failure path: fail the entry with the cause first, then tear the
/// connection down so the close watcher cannot claim the entry.
fn abandon_write(
    pending: &PendingRequests,
    connections: &ConnectionRegistry,
    connection: &Connection,
    addr: SocketAddr,
    request_id: u32,
    cause: RpcError,
) {
    tracing::warn!(
        "Write of request {} to {} failed: {}",
        request_id,
        addr,
        cause
    );
    let reason = cause.to_string();
    pending.fail(request_id, cause);
    connection.close(reason);
    connections.remove_if(&addr, connection.id());
}

/// Routes inbound messages of every client connection.
struct ResponseRouter {
    pending: Arc<PendingRequests>,
}

impl MessageHandler for ResponseRouter {
    fn on_message(&self, connection: &Connection, message: RpcMessage) {
        let request_id = message.request_id;

        match message.body {
            MessageBody::Response(response) => {
                if response.request_id != request_id {
                    tracing::debug!(
                        "Response body id {} differs from header id {}, using header",
                        response.request_id,
                        request_id
                    );
                }
                self.pending.complete(request_id, response);
            }
            MessageBody::Empty if message.message_type == MessageType::Response => {
                let response = RpcResponse {
                    request_id,
                    code: ResponseCode::Success,
                    message: String::new(),
                    data: None,
                };
                self.pending.complete(request_id, response);
            }
            MessageBody::Pong => {
                tracing::trace!("Heartbeat response on connection {}", connection.id());
            }
            MessageBody::Ping => {
                tracing::trace!(
                    "Ignoring heartbeat request on client connection {}",
                    connection.id()
                );
            }
            MessageBody::Request(_) | MessageBody::Empty => {
                tracing::warn!(
                    "Ignoring inbound request {} on client connection {}",
                    request_id,
                    connection.id()
                );
            }
        }
    }
}

/// Future of one response.
///
/// Resolves exactly once: with the response, or with the timeout,
/// connection or write error that abandoned the request.
#[derive(Debug)]
pub struct ResponseHandle {
    request_id: u32,
    slot: ResponseSlot,
    timer: Option<AbortHandle>,
}

impl ResponseHandle {
    fn new(request_id: u32, slot: ResponseSlot, timer: Option<AbortHandle>) -> Self {
        Self {
            request_id,
            slot,
            timer,
        }
    }

    /// Id assigned to the request.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Take the outcome if it is already available.
    pub fn try_take(&mut self) -> Option<Result<RpcResponse>> {
        match self.slot.try_recv() {
            Ok(outcome) => {
                self.finish();
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(RpcError::ConnectionClosed)),
        }
    }

    /// Block the current thread until the outcome is available.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_wait(self) -> Result<RpcResponse> {
        let ResponseHandle { slot, timer, .. } = self;
        let outcome = slot.blocking_recv().unwrap_or(Err(RpcError::ConnectionClosed));
        if let Some(timer) = timer {
            timer.abort();
        }
        outcome
    }

    fn finish(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Future for ResponseHandle {
    type Output = Result<RpcResponse>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.slot).poll(cx) {
            Poll::Ready(outcome) => {
                this.finish();
                Poll::Ready(outcome.unwrap_or(Err(RpcError::ConnectionClosed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
