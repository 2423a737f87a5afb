//! Service address resolution.
//!
//! The client only needs [`ServiceDiscovery::lookup`]. [`LocalRegistry`] is
//! an in-process implementation of both sides, useful for tests and for
//! static deployments where addresses are known up front.
//!
//! # Example
//!
//! ```
//! use rpcwire::discovery::{LocalRegistry, ServiceDiscovery, ServiceRegistry};
//!
//! let registry = LocalRegistry::new();
//! registry.register("demo.Hello", "127.0.0.1:9998".parse().unwrap());
//! assert!(registry.lookup("demo.Hello").is_some());
//! assert!(registry.lookup("demo.Missing").is_none());
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

/// Resolves a logical service name to a network address.
pub trait ServiceDiscovery: Send + Sync + 'static {
    /// Address of one instance of `service`, or `None` if none is known.
    fn lookup(&self, service: &str) -> Option<SocketAddr>;
}

/// Publishes service instances.
pub trait ServiceRegistry: Send + Sync + 'static {
    /// Announce an instance of `service` at `addr`.
    fn register(&self, service: &str, addr: SocketAddr);

    /// Withdraw an instance. Returns whether it was registered.
    fn deregister(&self, service: &str, addr: SocketAddr) -> bool;
}

/// Instances of one service plus a rotation cursor.
#[derive(Debug, Default)]
struct Instances {
    addrs: Vec<SocketAddr>,
    cursor: AtomicUsize,
}

/// In-memory registry with round-robin lookup.
#[derive(Debug, Default)]
pub struct LocalRegistry {
    services: DashMap<String, Instances>,
}

impl LocalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with one address per service.
    pub fn from_static<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, SocketAddr)>,
        S: AsRef<str>,
    {
        let registry = Self::new();
        for (service, addr) in entries {
            registry.register(service.as_ref(), addr);
        }
        registry
    }

    /// All known instances of a service.
    pub fn instances(&self, service: &str) -> Vec<SocketAddr> {
        self.services
            .get(service)
            .map(|entry| entry.addrs.clone())
            .unwrap_or_default()
    }
}

impl ServiceDiscovery for LocalRegistry {
    fn lookup(&self, service: &str) -> Option<SocketAddr> {
        let entry = self.services.get(service)?;
        if entry.addrs.is_empty() {
            return None;
        }
        let index = entry.cursor.fetch_add(1, Ordering::Relaxed) % entry.addrs.len();
        Some(entry.addrs[index])
    }
}

impl ServiceRegistry for LocalRegistry {
    fn register(&self, service: &str, addr: SocketAddr) {
        let mut entry = self.services.entry(service.to_string()).or_default();
        if !entry.addrs.contains(&addr) {
            entry.addrs.push(addr);
            tracing::debug!("Registered {} at {}", service, addr);
        }
    }

    fn deregister(&self, service: &str, addr: SocketAddr) -> bool {
        let removed = match self.services.get_mut(service) {
            Some(mut entry) => {
                let before = entry.addrs.len();
                entry.addrs.retain(|a| *a != addr);
                entry.addrs.len() != before
            }
            None => false,
        };
        self.services.remove_if(service, |_, entry| entry.addrs.is_empty());
        removed
    }
}

impl<F> ServiceDiscovery for F
where
    F: Fn(&str) -> Option<SocketAddr> + Send + Sync + 'static,
{
    fn lookup(&self, service: &str) -> Option<SocketAddr> {
        self(service)
    }
}
