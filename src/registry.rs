//! Registry of pools keyed by domain

use crate::client::Client;
use crate::connection::Lifecycle;
use crate::metrics::PoolMetrics;
use crate::pool::Pool;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Concurrent map from domain to pool.
///
/// Services look their pool up by domain and get a [`Client`] back.
///
/// # Examples
///
/// ```
/// use esox_connpool::{Connection, Lifecycle, Pool, PoolRegistry};
/// use std::sync::Arc;
///
/// struct Conn;
/// impl Lifecycle for Conn {}
///
/// let registry = PoolRegistry::new();
/// registry.register(Arc::new(Pool::new("users", 4, |pool: &Pool<Conn>| {
///     Ok(Connection::new(Conn, pool.version()))
/// })));
///
/// let client = registry.client("users", "profile-service").unwrap();
/// assert!(client.get_client().is_ok());
/// assert!(registry.client("orders", "checkout").is_none());
/// ```
pub struct PoolRegistry<C, S = ()> {
    pools: DashMap<String, Arc<Pool<C, S>>>,
}

impl<C: Lifecycle, S> PoolRegistry<C, S> {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// Register a pool under its domain, returning the pool it replaced
    pub fn register(&self, pool: Arc<Pool<C, S>>) -> Option<Arc<Pool<C, S>>> {
        let domain = pool.domain().to_string();
        debug!(domain = %domain, "Registering pool");
        self.pools.insert(domain, pool)
    }

    pub fn get(&self, domain: &str) -> Option<Arc<Pool<C, S>>> {
        self.pools.get(domain).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a pool. Its idle connections are closed.
    pub fn remove(&self, domain: &str) -> Option<Arc<Pool<C, S>>> {
        let (_, pool) = self.pools.remove(domain)?;
        let closed = pool.close_idle();
        debug!(domain, closed, "Removed pool");
        Some(pool)
    }

    /// Client facade for `service` on the pool registered under `domain`
    pub fn client(&self, domain: &str, service: impl Into<String>) -> Option<Client<C, S>> {
        self.get(domain).map(|pool| Client::new(service, pool))
    }

    pub fn domains(&self) -> Vec<String> {
        self.pools.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Bump the version of every registered pool
    pub fn invalidate_all(&self) {
        for entry in self.pools.iter() {
            entry.value().incr_version();
        }
    }

    pub fn get_metrics(&self) -> Vec<PoolMetrics> {
        self.pools.iter().map(|entry| entry.value().get_metrics()).collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<C: Lifecycle, S> Default for PoolRegistry<C, S> {
    fn default() -> Self {
        Self::new()
    }
}
