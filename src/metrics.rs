//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative acquire/release counts. Never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Statistics {
    pub acquire_count: u64,
    pub release_count: u64,
}

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_connpool::{Connection, Lifecycle, Pool};
///
/// struct Client;
/// impl Lifecycle for Client {}
///
/// let pool: Pool<Client> = Pool::new("users", 4, |pool: &Pool<Client>| {
///     Ok(Connection::new(Client, pool.version()))
/// });
///
/// let conn = pool.acquire().unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_acquired, 1);
/// assert_eq!(metrics.in_use, 1);
/// pool.release(conn);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Domain of the pool
    pub domain: String,

    /// Total successful acquisitions
    pub total_acquired: u64,

    /// Total releases
    pub total_released: u64,

    /// Connections created by the factory
    pub total_created: u64,

    /// Connections closed because they were stale, expired, overused or closed
    pub total_discarded: u64,

    /// Acquisitions rejected because the pool was at capacity
    pub capacity_rejections: u64,

    /// Factory calls that returned an error
    pub factory_failures: u64,

    /// Connections currently checked out
    pub in_use: usize,

    /// Idle connections in the free-list
    pub idle: usize,

    /// Configured capacity
    pub capacity: usize,

    /// Current pool epoch
    pub version: u64,

    /// Pool utilization ratio (in_use / capacity)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("domain".to_string(), self.domain.clone());
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_discarded".to_string(), self.total_discarded.to_string());
        metrics.insert("capacity_rejections".to_string(), self.capacity_rejections.to_string());
        metrics.insert("factory_failures".to_string(), self.factory_failures.to_string());
        metrics.insert("in_use".to_string(), self.in_use.to_string());
        metrics.insert("idle".to_string(), self.idle.to_string());
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics.insert("version".to_string(), self.version.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format.
    ///
    /// The pool domain is attached as the `pool` label, together with any
    /// extra `tags`. Registration or encoding errors are logged and produce an
    /// empty export.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::{Connection, Lifecycle, Pool};
    /// use std::collections::HashMap;
    ///
    /// struct Client;
    /// impl Lifecycle for Client {}
    ///
    /// let pool: Pool<Client> = Pool::new("orders", 4, |pool: &Pool<Client>| {
    ///     Ok(Connection::new(Client, pool.version()))
    /// });
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus(Some(&tags));
    /// assert!(output.contains("connpool_connections_in_use"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        match Self::encode(metrics, tags) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(
                    pool = %metrics.domain,
                    error = %err,
                    "Failed to export pool metrics"
                );
                String::new()
            }
        }
    }

    fn encode(
        metrics: &PoolMetrics,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), metrics.domain.clone());
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let registry = Registry::new_custom(Some("connpool".to_string()), Some(labels))?;

        let gauges = [
            ("connections_in_use", "Connections currently checked out", metrics.in_use),
            ("connections_idle", "Idle connections in the free-list", metrics.idle),
            ("capacity", "Configured pool capacity", metrics.capacity),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::new(name, help)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let version = IntGauge::new("version", "Current pool epoch")?;
        version.set(metrics.version as i64);
        registry.register(Box::new(version))?;

        let utilization = Gauge::new("utilization", "Pool utilization ratio")?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let counters = [
            ("acquired_total", "Total acquisitions", metrics.total_acquired),
            ("released_total", "Total releases", metrics.total_released),
            ("created_total", "Connections created", metrics.total_created),
            ("discarded_total", "Connections retired or discarded", metrics.total_discarded),
            (
                "capacity_rejections_total",
                "Acquisitions rejected at capacity",
                metrics.capacity_rejections,
            ),
            ("factory_failures_total", "Failed connection creations", metrics.factory_failures),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::new(name, help)?;
            counter.inc_by(value);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub acquired: AtomicU64,
    pub released: AtomicU64,
    pub created: AtomicU64,
    pub discarded: AtomicU64,
    pub capacity_rejections: AtomicU64,
    pub factory_failures: AtomicU64,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            acquire_count: self.acquired.load(Ordering::Relaxed),
            release_count: self.released.load(Ordering::Relaxed),
        }
    }

    pub fn get_metrics(
        &self,
        domain: &str,
        in_use: usize,
        idle: usize,
        capacity: usize,
        version: u64,
    ) -> PoolMetrics {
        let utilization = if capacity > 0 {
            in_use as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            domain: domain.to_string(),
            total_acquired: self.acquired.load(Ordering::Relaxed),
            total_released: self.released.load(Ordering::Relaxed),
            total_created: self.created.load(Ordering::Relaxed),
            total_discarded: self.discarded.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
            in_use,
            idle,
            capacity,
            version,
            utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_snapshot() {
        let tracker = MetricsTracker::new();
        MetricsTracker::record(&tracker.acquired);
        MetricsTracker::record(&tracker.acquired);
        MetricsTracker::record(&tracker.released);
        MetricsTracker::record(&tracker.discarded);

        let stats = tracker.statistics();
        assert_eq!(stats.acquire_count, 2);
        assert_eq!(stats.release_count, 1);

        let metrics = tracker.get_metrics("db", 1, 3, 4, 2);
        assert_eq!(metrics.total_discarded, 1);
        assert_eq!(metrics.utilization, 0.25);

        let exported = metrics.export();
        assert_eq!(exported["utilization"], "0.25");
        assert_eq!(exported["version"], "2");
        assert_eq!(exported["domain"], "db");
    }

    #[test]
    fn test_zero_capacity_utilization() {
        let metrics = MetricsTracker::new().get_metrics("db", 0, 0, 0, 0);
        assert_eq!(metrics.utilization, 0.0);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export() {
        let tracker = MetricsTracker::new();
        MetricsTracker::record(&tracker.created);
        let metrics = tracker.get_metrics("db", 1, 0, 2, 0);

        let output = MetricsExporter::export_prometheus(&metrics, None);
        assert!(output.contains("connpool_created_total"));
        assert!(output.contains("pool=\"db\""));
        assert!(output.contains("connpool_utilization"));
    }
}
