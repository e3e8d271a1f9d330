//! Core connection pool implementation

use crate::config::PoolConfiguration;
use crate::connection::{Connection, Lifecycle};
use crate::errors::{BoxError, PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics, Statistics};
use crate::retirement::{RetirementPolicy, clamp_drop_threshold};
use crate::ring::Ring;

use crossbeam::utils::CachePadded;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Creates a new connection for the pool.
///
/// The factory must stamp the connection with `pool.version()`.
pub type Factory<C, S> =
    Arc<dyn Fn(&Pool<C, S>) -> Result<Connection<C, S>, BoxError> + Send + Sync>;

/// Thread-safe pool of reusable client connections for one domain.
///
/// Acquisition pops an idle connection or creates one through the factory;
/// release resets the connection and parks it again, unless it closed itself or
/// reached its usage limit.
///
/// Capacity bounds the number of checked-out connections. The capacity check
/// and the in-use increment are not a single atomic step, so concurrent
/// acquisitions near the limit may briefly create more connections than the
/// limit allows. [`HealthStatus`] reports such an overshoot.
///
/// # Examples
///
/// ```
/// use esox_connpool::{Connection, Lifecycle, Pool, PoolError};
///
/// struct Client;
/// impl Lifecycle for Client {}
///
/// let pool: Pool<Client> = Pool::new("accounts", 1, |pool: &Pool<Client>| {
///     Ok(Connection::new(Client, pool.version()))
/// });
///
/// let conn = pool.acquire().unwrap();
/// assert!(matches!(pool.acquire(), Err(PoolError::CapacityExceeded(1))));
///
/// pool.release(conn);
/// assert_eq!(pool.len(), 1);
/// assert!(pool.acquire().is_ok());
/// ```
pub struct Pool<C, S = ()> {
    domain: String,
    free: Ring<Connection<C, S>>,
    limit: AtomicUsize,
    in_use: CachePadded<AtomicUsize>,
    version: AtomicU64,
    factory: Factory<C, S>,
    conn_expire_nanos: AtomicU64,
    conn_max_usage: AtomicU64,
    drop_conn_threshold: AtomicU64,
    description: RwLock<String>,
    payload: RwLock<String>,
    metrics: MetricsTracker,
}

impl<C: Lifecycle, S> Pool<C, S> {
    /// Create a pool with the given capacity and default retirement settings
    pub fn new<F>(domain: impl Into<String>, limit: usize, factory: F) -> Self
    where
        F: Fn(&Pool<C, S>) -> Result<Connection<C, S>, BoxError> + Send + Sync + 'static,
    {
        Self::with_config(domain, PoolConfiguration::new().with_capacity(limit), factory)
    }

    /// Create a pool from a full configuration
    pub fn with_config<F>(domain: impl Into<String>, config: PoolConfiguration, factory: F) -> Self
    where
        F: Fn(&Pool<C, S>) -> Result<Connection<C, S>, BoxError> + Send + Sync + 'static,
    {
        let domain = domain.into();
        debug!(
            domain = %domain,
            capacity = config.capacity,
            conn_expire_secs = config.conn_expire.map(|d| d.as_secs_f64()),
            conn_max_usage = config.conn_max_usage,
            "Creating connection pool"
        );

        Self {
            domain,
            free: Ring::new(),
            limit: AtomicUsize::new(config.capacity),
            in_use: CachePadded::new(AtomicUsize::new(0)),
            version: AtomicU64::new(0),
            factory: Arc::new(factory),
            conn_expire_nanos: AtomicU64::new(duration_to_nanos(
                config.conn_expire.unwrap_or_default(),
            )),
            conn_max_usage: AtomicU64::new(config.conn_max_usage.unwrap_or(0)),
            drop_conn_threshold: AtomicU64::new(
                clamp_drop_threshold(config.drop_conn_threshold).to_bits(),
            ),
            description: RwLock::new(config.description),
            payload: RwLock::new(config.payload),
            metrics: MetricsTracker::new(),
        }
    }

    /// Take a connection out of the pool.
    ///
    /// Idle connections that are stale (older epoch), closed or past their
    /// expiry are closed and skipped. When no idle connection is usable a new
    /// one is created, unless the pool is at capacity.
    pub fn acquire(&self) -> PoolResult<Connection<C, S>> {
        let attempts = self.free.len();
        for _ in 0..attempts {
            let Some(mut conn) = self.free.pop() else {
                break;
            };

            if conn.version() != self.version() {
                self.discard(&mut conn, "stale version");
                continue;
            }
            if conn.is_closed() {
                self.discard(&mut conn, "closed");
                continue;
            }
            if self.retirement_policy().is_expired(conn.age()) {
                self.discard(&mut conn, "expired");
                continue;
            }

            self.check_out();
            trace!(domain = %self.domain, usage = conn.usage(), "Reusing idle connection");
            return Ok(conn);
        }

        self.create()
    }

    /// Return a connection to the pool. `None` is ignored.
    ///
    /// A connection that reports itself closed is dropped. Otherwise it is
    /// reset and parked again, unless it has exceeded its usage limit.
    pub fn release(&self, conn: impl Into<Option<Connection<C, S>>>) {
        let Some(mut conn) = conn.into() else {
            return;
        };

        conn.incr_usage();
        if conn.is_closed() {
            debug!(
                domain = %self.domain,
                usage = conn.usage(),
                "Dropping connection closed by its client"
            );
            MetricsTracker::record(&self.metrics.discarded);
        } else {
            if let Err(err) = conn.reset() {
                warn!(domain = %self.domain, error = %err, "Failed to reset connection");
            }
            if self.retirement_policy().is_overused(conn.usage()) {
                self.discard(&mut conn, "usage limit");
            } else {
                self.free.push(conn);
            }
        }

        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
        MetricsTracker::record(&self.metrics.released);
    }

    /// Invalidate every connection created under the current epoch.
    ///
    /// Idle connections are not touched here; they are closed lazily when a
    /// later `acquire` draws them.
    pub fn incr_version(&self) {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(domain = %self.domain, version, "Bumped pool version");
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Number of idle connections
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Number of connections currently checked out
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    pub fn set_capacity(&self, limit: usize) {
        self.limit.store(limit, Ordering::Relaxed);
    }

    /// Maximum connection age; `None` when expiry is disabled
    pub fn conn_expire(&self) -> Option<Duration> {
        match self.conn_expire_nanos.load(Ordering::Relaxed) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    /// Set the maximum connection age. Zero disables expiry.
    pub fn set_conn_expire(&self, expire: Duration) {
        self.conn_expire_nanos.store(duration_to_nanos(expire), Ordering::Relaxed);
    }

    /// Maximum usage count; `None` when the cap is disabled
    pub fn conn_max_usage(&self) -> Option<u64> {
        match self.conn_max_usage.load(Ordering::Relaxed) {
            0 => None,
            usage => Some(usage),
        }
    }

    /// Set the maximum usage count. Zero disables the cap.
    pub fn set_conn_max_usage(&self, usage: u64) {
        self.conn_max_usage.store(usage, Ordering::Relaxed);
    }

    pub fn drop_conn_threshold(&self) -> f64 {
        f64::from_bits(self.drop_conn_threshold.load(Ordering::Relaxed))
    }

    /// Set the retirement jitter ratio, clamped to `[0, 1]`
    pub fn set_drop_conn_threshold(&self, threshold: f64) {
        let threshold = clamp_drop_threshold(threshold);
        self.drop_conn_threshold.store(threshold.to_bits(), Ordering::Relaxed);
    }

    pub fn description(&self) -> String {
        self.description.read().clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.write() = description.into();
    }

    pub fn payload(&self) -> String {
        self.payload.read().clone()
    }

    pub fn set_payload(&self, payload: impl Into<String>) {
        *self.payload.write() = payload.into();
    }

    /// Current retirement settings
    pub fn retirement_policy(&self) -> RetirementPolicy {
        RetirementPolicy {
            conn_expire: self.conn_expire(),
            conn_max_usage: self.conn_max_usage(),
            drop_conn_threshold: self.drop_conn_threshold(),
        }
    }

    /// Cumulative acquire/release counts
    pub fn statistics(&self) -> Statistics {
        self.metrics.statistics()
    }

    /// Pre-create idle connections, up to the free capacity of the pool.
    ///
    /// Returns how many connections were added. Stops at the first factory
    /// error, keeping the connections created so far.
    pub fn warmup(&self, count: usize) -> PoolResult<usize> {
        let free_capacity = self
            .capacity()
            .saturating_sub(self.in_use())
            .saturating_sub(self.len());
        let target = count.min(free_capacity);

        for created in 0..target {
            match (self.factory)(self) {
                Ok(conn) => {
                    MetricsTracker::record(&self.metrics.created);
                    self.free.push(conn);
                }
                Err(err) => {
                    MetricsTracker::record(&self.metrics.factory_failures);
                    warn!(
                        domain = %self.domain,
                        error = %err,
                        created,
                        "Warm-up stopped by factory error"
                    );
                    return Err(PoolError::factory(err));
                }
            }
        }

        debug!(domain = %self.domain, created = target, "Warmed up pool");
        Ok(target)
    }

    /// Close and remove every idle connection. Returns how many were closed.
    ///
    /// Checked-out connections are unaffected and can still be released.
    pub fn close_idle(&self) -> usize {
        let idle = self.free.drain();
        let count = idle.len();
        for mut conn in idle {
            self.discard(&mut conn, "pool drained");
        }
        count
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(self.len(), self.in_use(), self.capacity())
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.metrics.get_metrics(
            &self.domain,
            self.in_use(),
            self.len(),
            self.capacity(),
            self.version(),
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(&self, tags: Option<&HashMap<String, String>>) -> String {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), tags)
    }

    fn create(&self) -> PoolResult<Connection<C, S>> {
        let limit = self.capacity();
        if self.in_use() >= limit {
            MetricsTracker::record(&self.metrics.capacity_rejections);
            debug!(domain = %self.domain, limit, "Pool capacity exceeded");
            return Err(PoolError::CapacityExceeded(limit));
        }

        let conn = (self.factory)(self).map_err(|err| {
            MetricsTracker::record(&self.metrics.factory_failures);
            warn!(domain = %self.domain, error = %err, "Failed to create connection");
            PoolError::factory(err)
        })?;

        MetricsTracker::record(&self.metrics.created);
        self.check_out();
        trace!(domain = %self.domain, version = conn.version(), "Created connection");
        Ok(conn)
    }

    fn check_out(&self) {
        self.in_use.fetch_add(1, Ordering::AcqRel);
        MetricsTracker::record(&self.metrics.acquired);
    }

    fn discard(&self, conn: &mut Connection<C, S>, reason: &'static str) {
        trace!(domain = %self.domain, reason, usage = conn.usage(), "Discarding connection");
        if let Err(err) = conn.close() {
            warn!(
                domain = %self.domain,
                reason,
                error = %err,
                "Failed to close discarded connection"
            );
        }
        MetricsTracker::record(&self.metrics.discarded);
    }
}

impl<C, S> Pool<C, S>
where
    C: Lifecycle + Send + 'static,
    S: Send + 'static,
{
    /// Warm up on the blocking thread pool, since factories may block on I/O
    pub async fn warmup_async(self: &Arc<Self>, count: usize) -> PoolResult<usize> {
        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || pool.warmup(count))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }
}

impl<C, S> std::fmt::Debug for Pool<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("domain", &self.domain)
            .field("capacity", &self.limit.load(Ordering::Relaxed))
            .field("in_use", &self.in_use.load(Ordering::Relaxed))
            .field("idle", &self.free.len())
            .field("version", &self.version.load(Ordering::Relaxed))
            .finish()
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Debug, Default)]
    struct TestClient {
        closed: Arc<AtomicBool>,
        resets: usize,
    }

    impl Lifecycle for TestClient {
        fn close(&mut self) -> Result<(), BoxError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn reset(&mut self) -> Result<(), BoxError> {
            self.resets += 1;
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn test_pool(limit: usize) -> Pool<TestClient> {
        Pool::new("test", limit, |pool: &Pool<TestClient>| {
            Ok(Connection::new(TestClient::default(), pool.version()))
        })
    }

    #[test]
    fn test_basic_attributes() {
        let pool = test_pool(10);
        assert_eq!(pool.domain(), "test");
        assert_eq!(pool.version(), 0);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.capacity(), 10);
        assert_eq!(pool.drop_conn_threshold(), 0.1);
        assert!(pool.conn_expire().is_none());
        assert!(pool.conn_max_usage().is_none());
    }

    #[test]
    fn test_acquire_release() {
        let pool = test_pool(10);
        let conn = pool.acquire().unwrap();
        assert!(!conn.client().is_closed());
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.in_use(), 1);

        pool.release(conn);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_round_trip_increments_usage_and_resets() {
        let pool = test_pool(10);
        let conn = pool.acquire().unwrap();
        let before = conn.usage();
        pool.release(conn);

        let conn = pool.acquire().unwrap();
        assert_eq!(conn.usage(), before + 1);
        assert_eq!(conn.client().resets, 1);
        assert_eq!(pool.len(), 0);
        pool.release(conn);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_capacity_exceeded_after_limit() {
        let pool = test_pool(3);
        let conns: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
        assert!(matches!(pool.acquire(), Err(PoolError::CapacityExceeded(3))));
        assert_eq!(pool.get_metrics().capacity_rejections, 1);

        for conn in conns {
            pool.release(conn);
        }
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_closed_connection_is_not_requeued() {
        let pool = test_pool(10);
        let mut conn = pool.acquire().unwrap();
        conn.client_mut().close().unwrap();
        pool.release(conn);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.statistics().release_count, 1);
    }

    #[test]
    fn test_idle_connection_closed_remotely_is_skipped() {
        let pool = test_pool(10);
        let conn = pool.acquire().unwrap();
        let closed = Arc::clone(&conn.client().closed);
        pool.release(conn);

        closed.store(true, Ordering::SeqCst);
        let conn = pool.acquire().unwrap();
        assert!(!conn.is_closed());
        assert_eq!(conn.usage(), 0);
        assert_eq!(pool.get_metrics().total_discarded, 1);
        pool.release(conn);
    }

    #[test]
    fn test_version_bump_invalidates_idle() {
        let pool = test_pool(10);
        let conn = pool.acquire().unwrap();
        let stale_flag = Arc::clone(&conn.client().closed);
        pool.release(conn);

        pool.incr_version();
        assert_eq!(pool.version(), 1);
        assert_eq!(pool.len(), 1);

        let conn = pool.acquire().unwrap();
        assert_eq!(conn.version(), 1);
        assert!(stale_flag.load(Ordering::SeqCst), "stale connection was closed");
        pool.release(conn);

        // The fresh connection survives another round trip
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.version(), 1);
        assert_eq!(conn.usage(), 1);
        pool.release(conn);
    }

    #[test]
    fn test_usage_limit_discards_on_release() {
        let pool = test_pool(10);
        pool.set_conn_max_usage(2);
        pool.set_drop_conn_threshold(0.0);

        let conn = pool.acquire().unwrap();
        pool.release(conn);
        let conn = pool.acquire().unwrap();
        pool.release(conn);
        assert_eq!(pool.len(), 1);

        let conn = pool.acquire().unwrap();
        assert_eq!(conn.usage(), 2);
        let closed = Arc::clone(&conn.client().closed);
        pool.release(conn);
        assert_eq!(pool.len(), 0);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_expired_connection_is_replaced() {
        let pool = test_pool(10);
        pool.set_conn_expire(Duration::from_millis(20));

        let conn = pool.acquire().unwrap();
        pool.release(conn);
        std::thread::sleep(Duration::from_millis(40));

        let conn = pool.acquire().unwrap();
        assert_eq!(conn.usage(), 0);
        assert_eq!(pool.get_metrics().total_created, 2);
        pool.release(conn);
    }

    #[test]
    fn test_unbounded_drop_threshold_is_clamped() {
        for threshold in [1e18, f64::INFINITY] {
            let pool = test_pool(10);
            pool.set_conn_expire(Duration::from_secs(60));
            pool.set_drop_conn_threshold(threshold);
            assert_eq!(pool.drop_conn_threshold(), 1.0);

            let conn = pool.acquire().unwrap();
            pool.release(conn);
            let conn = pool.acquire().unwrap();
            pool.release(conn);
            assert_eq!(pool.in_use(), 0);
        }

        let config = PoolConfiguration {
            conn_expire: Some(Duration::from_secs(60)),
            drop_conn_threshold: f64::INFINITY,
            ..Default::default()
        };
        let pool = Pool::with_config("raw", config, |pool: &Pool<TestClient>| {
            Ok(Connection::new(TestClient::default(), pool.version()))
        });
        assert_eq!(pool.drop_conn_threshold(), 1.0);
        let conn = pool.acquire().unwrap();
        pool.release(conn);
        let conn = pool.acquire().unwrap();
        pool.release(conn);
    }

    #[derive(Debug, Default)]
    struct FailingClient;

    impl Lifecycle for FailingClient {
        fn close(&mut self) -> Result<(), BoxError> {
            Err("close failed".into())
        }

        fn reset(&mut self) -> Result<(), BoxError> {
            Err("reset failed".into())
        }
    }

    fn failing_pool(limit: usize) -> Pool<FailingClient> {
        Pool::new("failing", limit, |pool: &Pool<FailingClient>| {
            Ok(Connection::new(FailingClient, pool.version()))
        })
    }

    #[test]
    fn test_reset_error_still_requeues() {
        let pool = failing_pool(2);

        let conn = pool.acquire().unwrap();
        pool.release(conn);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.in_use(), 0);

        let conn = pool.acquire().unwrap();
        assert_eq!(conn.usage(), 1);
        pool.release(conn);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get_metrics().total_created, 1);
    }

    #[test]
    fn test_close_error_on_stale_connection_is_swallowed() {
        let pool = failing_pool(2);
        let conn = pool.acquire().unwrap();
        pool.release(conn);

        pool.incr_version();
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.version(), 1);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.get_metrics().total_discarded, 1);

        pool.release(conn);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_factory_error_propagates() {
        let pool: Pool<TestClient> = Pool::new("broken", 2, |_: &Pool<TestClient>| {
            Err("connection refused".into())
        });

        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, PoolError::Factory(_)));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.statistics().acquire_count, 0);
        assert_eq!(pool.get_metrics().factory_failures, 1);
    }

    #[test]
    fn test_release_none_is_noop() {
        let pool = test_pool(1);
        pool.release(None::<Connection<TestClient>>);
        assert_eq!(pool.statistics().release_count, 0);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_session_cleared_on_release() {
        let pool: Pool<TestClient, String> =
            Pool::new("sessions", 1, |pool: &Pool<TestClient, String>| {
                Ok(Connection::new(TestClient::default(), pool.version()))
            });

        let mut conn = pool.acquire().unwrap();
        conn.set_session("user-7".to_string());
        pool.release(conn);

        let conn = pool.acquire().unwrap();
        assert!(conn.session().is_none());
        pool.release(conn);
    }

    #[test]
    fn test_warmup_and_close_idle() {
        let pool = test_pool(4);
        let held = pool.acquire().unwrap();

        assert_eq!(pool.warmup(10).unwrap(), 3);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.warmup(1).unwrap(), 0);

        assert_eq!(pool.close_idle(), 3);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.get_metrics().total_discarded, 3);

        pool.release(held);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_bookkeeping_setters() {
        let pool = test_pool(1);
        pool.set_description("primary");
        pool.set_payload("region=eu");
        pool.set_capacity(5);
        assert_eq!(pool.description(), "primary");
        assert_eq!(pool.payload(), "region=eu");
        assert_eq!(pool.capacity(), 5);
    }

    #[tokio::test]
    async fn test_warmup_async() {
        let pool = Arc::new(test_pool(2));
        assert_eq!(pool.warmup_async(5).await.unwrap(), 2);
        assert_eq!(pool.len(), 2);
    }
}
