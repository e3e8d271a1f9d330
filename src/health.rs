//! Health reporting for connection pools

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_connpool::HealthStatus;
///
/// let health = HealthStatus::new(3, 1, 10);
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_connections, 3);
///
/// // More checkouts than capacity: concurrent creation overshot the limit
/// let health = HealthStatus::new(0, 11, 10);
/// assert!(!health.is_healthy());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (in_use / capacity)
    pub utilization: f64,

    /// Idle connections count
    pub idle_connections: usize,

    /// Checked-out connections count
    pub in_use_connections: usize,

    /// Configured capacity
    pub capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub fn new(idle: usize, in_use: usize, capacity: usize) -> Self {
        let utilization = if capacity > 0 {
            in_use as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if in_use > capacity {
            warnings.push(format!(
                "Capacity overshoot: {} connections checked out, limit is {}",
                in_use, capacity
            ));
            is_healthy = false;
        } else if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if idle + in_use > capacity && in_use <= capacity {
            warnings.push(format!(
                "Idle connections exceed free capacity: {} idle, {} in use, limit {}",
                idle, in_use, capacity
            ));
        }

        if capacity == 0 {
            warnings.push("Pool capacity is zero".to_string());
            is_healthy = false;
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_connections: idle,
            in_use_connections: in_use,
            capacity,
            warnings,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
