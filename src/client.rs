//! Scoped client access on top of a pool

use crate::connection::{Connection, Lifecycle};
use crate::errors::PoolResult;
use crate::pool::Pool;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A checked-out client that goes back to its pool when dropped
pub struct PooledClient<C: Lifecycle, S = ()> {
    conn: Option<Connection<C, S>>,
    pool: Arc<Pool<C, S>>,
}

impl<C: Lifecycle, S> PooledClient<C, S> {
    fn new(conn: Connection<C, S>, pool: Arc<Pool<C, S>>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// The pooled connection, for usage counters and session access
    pub fn connection(&self) -> &Connection<C, S> {
        self.conn.as_ref().expect("connection already released")
    }

    pub fn connection_mut(&mut self) -> &mut Connection<C, S> {
        self.conn.as_mut().expect("connection already released")
    }

    /// Return the connection to the pool now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl<C: Lifecycle, S> Deref for PooledClient<C, S> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.connection().client()
    }
}

impl<C: Lifecycle, S> DerefMut for PooledClient<C, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection_mut().client_mut()
    }
}

impl<C: Lifecycle, S> Drop for PooledClient<C, S> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Convenience wrapper that hands out clients of one service.
///
/// # Examples
///
/// ```
/// use esox_connpool::{Client, Connection, Lifecycle, Pool};
/// use std::sync::Arc;
///
/// struct Rpc {
///     calls: usize,
/// }
/// impl Lifecycle for Rpc {}
///
/// let pool: Arc<Pool<Rpc>> = Arc::new(Pool::new("billing", 2, |pool: &Pool<Rpc>| {
///     Ok(Connection::new(Rpc { calls: 0 }, pool.version()))
/// }));
/// let client = Client::new("billing-api", Arc::clone(&pool));
///
/// {
///     let mut rpc = client.get_client().unwrap();
///     rpc.calls += 1;
/// }
///
/// assert_eq!(pool.len(), 1);
/// assert_eq!(pool.in_use(), 0);
/// ```
pub struct Client<C, S = ()> {
    service: String,
    pool: Arc<Pool<C, S>>,
}

impl<C: Lifecycle, S> Client<C, S> {
    pub fn new(service: impl Into<String>, pool: Arc<Pool<C, S>>) -> Self {
        Self {
            service: service.into(),
            pool,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn pool(&self) -> &Arc<Pool<C, S>> {
        &self.pool
    }

    /// Acquire a client. It is released exactly once, when the returned guard
    /// is dropped or [`PooledClient::release`] is called.
    pub fn get_client(&self) -> PoolResult<PooledClient<C, S>> {
        let conn = self.pool.acquire()?;
        Ok(PooledClient::new(conn, Arc::clone(&self.pool)))
    }
}

impl<C, S> Clone for Client<C, S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            pool: Arc::clone(&self.pool),
        }
    }
}
