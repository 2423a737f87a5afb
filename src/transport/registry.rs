//! Connection Registry: at most one live connection per remote address.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::connection::Connection;
use crate::error::Result;

/// Concurrent map from remote address to its current connection.
///
/// Lookups are lock-free. Creation is serialized per address, so concurrent
/// callers for the same address share a single connect attempt while other
/// addresses proceed independently.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<SocketAddr, Connection>,
    connecting: DashMap<SocketAddr, Arc<Mutex<()>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entry for `addr`, active or not.
    pub fn get(&self, addr: &SocketAddr) -> Option<Connection> {
        self.connections.get(addr).map(|entry| entry.value().clone())
    }

    /// Replace the entry for `addr`, returning the previous one.
    pub fn set(&self, addr: SocketAddr, connection: Connection) -> Option<Connection> {
        self.connections.insert(addr, connection)
    }

    /// Remove the entry for `addr`.
    pub fn remove(&self, addr: &SocketAddr) -> Option<Connection> {
        self.connections.remove(addr).map(|(_, connection)| connection)
    }

    /// Remove the entry for `addr` only if it is still `connection_id`.
    ///
    /// A replacement registered after the old connection died is kept.
    pub fn remove_if(&self, addr: &SocketAddr, connection_id: u64) -> bool {
        self.connections
            .remove_if(addr, |_, connection| connection.id() == connection_id)
            .is_some()
    }

    /// Return the active connection for `addr`, creating one with `connect`
    /// if it is missing or inactive.
    ///
    /// At most one `connect` runs per address at a time; callers that queue
    /// behind it reuse its result.
    pub async fn get_or_connect<F, Fut>(&self, addr: SocketAddr, connect: F) -> Result<Connection>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Connection>>,
    {
        if let Some(connection) = self.get(&addr).filter(Connection::is_active) {
            return Ok(connection);
        }

        // Declared before `lock` so it runs after the lock's Arc is dropped,
        // including when the caller cancels this future.
        let _prune = PruneConnectLock {
            connecting: &self.connecting,
            addr,
        };
        let lock = Arc::clone(&self.connecting.entry(addr).or_default());
        let _guard = lock.lock().await;

        self.connect_locked(addr, connect).await
    }

    async fn connect_locked<F, Fut>(&self, addr: SocketAddr, connect: F) -> Result<Connection>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Connection>>,
    {
        if let Some(existing) = self.get(&addr) {
            if existing.is_active() {
                return Ok(existing);
            }
            self.remove_if(&addr, existing.id());
        }

        let connection = connect().await?;
        if let Some(stale) = self.set(addr, connection.clone()) {
            stale.close("replaced");
        }
        Ok(connection)
    }

    /// Close and remove every connection. Returns how many were removed.
    pub fn close_all(&self, reason: &str) -> usize {
        let addrs: Vec<SocketAddr> = self.connections.iter().map(|e| *e.key()).collect();
        let mut closed = 0;
        for addr in addrs {
            if let Some(connection) = self.remove(&addr) {
                connection.close(reason);
                closed += 1;
            }
        }
        closed
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Drops the per-address connect lock once no caller holds it.
struct PruneConnectLock<'a> {
    connecting: &'a DashMap<SocketAddr, Arc<Mutex<()>>>,
    addr: SocketAddr,
}

impl Drop for PruneConnectLock<'_> {
    fn drop(&mut self) {
        self.connecting
            .remove_if(&self.addr, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecRegistry;
    use crate::error::RpcError;
    use crate::protocol::{MessageCodec, RpcMessage};
    use crate::transport::{ConnectionOptions, MessageHandler};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Ignore;

    impl MessageHandler for Ignore {
        fn on_message(&self, _connection: &Connection, _message: RpcMessage) {}
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn fake_connection(port: u16) -> (Connection, tokio::io::DuplexStream) {
        let (local, peer) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(local);
        let codec = MessageCodec::new(Arc::new(CodecRegistry::with_defaults()));
        let connection = Connection::spawn(
            addr(port),
            reader,
            writer,
            codec,
            Arc::new(Ignore),
            ConnectionOptions::default(),
        )
        .unwrap();
        (connection, peer)
    }

    #[tokio::test]
    async fn test_get_set_remove() {
        let registry = ConnectionRegistry::new();
        let (connection, _peer) = fake_connection(1);

        assert!(registry.get(&addr(1)).is_none());
        registry.set(addr(1), connection.clone());
        assert_eq!(registry.get(&addr(1)).unwrap().id(), connection.id());

        assert!(!registry.remove_if(&addr(1), connection.id() + 1000));
        assert!(registry.remove_if(&addr(1), connection.id()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_get_or_connect_connects_once() {
        let registry = Arc::new(ConnectionRegistry::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut peers = Vec::new();
        let (connection, peer) = fake_connection(2);
        peers.push(peer);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let attempts = attempts.clone();
            let connection = connection.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .get_or_connect(addr(2), || async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(connection)
                    })
                    .await
                    .unwrap()
                    .id()
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), connection.id());
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.connecting.is_empty());
    }

    #[tokio::test]
    async fn test_inactive_entry_is_replaced() {
        let registry = ConnectionRegistry::new();
        let (dead, _dead_peer) = fake_connection(3);
        registry.set(addr(3), dead.clone());
        dead.close("test");

        let (fresh, _fresh_peer) = fake_connection(3);
        let fresh_id = fresh.id();
        let got = registry
            .get_or_connect(addr(3), || async move { Ok(fresh) })
            .await
            .unwrap();

        assert_eq!(got.id(), fresh_id);
        assert_eq!(registry.get(&addr(3)).unwrap().id(), fresh_id);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_no_entry() {
        let registry = ConnectionRegistry::new();
        let result = registry
            .get_or_connect(addr(4), || async {
                Err(RpcError::Connection("refused".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(registry.get(&addr(4)).is_none());
        assert!(registry.connecting.is_empty());
    }

    #[tokio::test]
    async fn test_connect_locks_are_pruned() {
        let registry = ConnectionRegistry::new();
        let mut peers = Vec::new();

        for port in 10..20 {
            let (connection, peer) = fake_connection(port);
            peers.push(peer);
            registry
                .get_or_connect(addr(port), || async move { Ok(connection) })
                .await
                .unwrap();
        }

        assert_eq!(registry.len(), 10);
        assert!(registry.connecting.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_connect_releases_lock() {
        let registry = ConnectionRegistry::new();

        let attempt = registry.get_or_connect(addr(7), std::future::pending::<Result<Connection>>);
        let outcome = tokio::time::timeout(Duration::from_millis(50), attempt).await;
        assert!(outcome.is_err());

        assert!(registry.connecting.is_empty());
        assert!(registry.get(&addr(7)).is_none());
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = ConnectionRegistry::new();
        let (a, _pa) = fake_connection(5);
        let (b, _pb) = fake_connection(6);
        registry.set(addr(5), a.clone());
        registry.set(addr(6), b.clone());

        assert_eq!(registry.close_all("shutdown"), 2);
        assert!(registry.is_empty());
        assert!(!a.is_active());
        assert!(!b.is_active());
    }
}
