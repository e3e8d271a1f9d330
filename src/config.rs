//! Pool configuration options

use crate::retirement::clamp_drop_threshold;
use std::time::Duration;

/// Default ratio of the retirement window drawn as random jitter
pub const DEFAULT_DROP_CONN_THRESHOLD: f64 = 0.1;

/// Configuration for connection pool behavior
///
/// Every value here can also be changed on a live pool through its setters.
///
/// # Examples
///
/// ```
/// use esox_connpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_capacity(20)
///     .with_conn_expire(Duration::from_secs(3600))
///     .with_conn_max_usage(10_000);
///
/// assert_eq!(config.capacity, 20);
/// assert_eq!(config.conn_expire, Some(Duration::from_secs(3600)));
/// assert_eq!(config.drop_conn_threshold, 0.1);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration {
    /// Maximum number of connections checked out at the same time
    pub capacity: usize,

    /// Maximum age of a connection before it is retired on acquire
    pub conn_expire: Option<Duration>,

    /// Maximum number of acquire/release cycles before a connection is retired on release
    pub conn_max_usage: Option<u64>,

    /// Fraction of the expiry/usage limit used as the random retirement window
    pub drop_conn_threshold: f64,

    /// Free-form description for operational bookkeeping
    pub description: String,

    /// Free-form payload for operational bookkeeping
    pub payload: String,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            capacity: 100,
            conn_expire: None,
            conn_max_usage: None,
            drop_conn_threshold: DEFAULT_DROP_CONN_THRESHOLD,
            description: String::new(),
            payload: String::new(),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_capacity(5);
    /// assert_eq!(config.capacity, 5);
    /// ```
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Retire connections older than `expire`. A zero duration disables expiry.
    pub fn with_conn_expire(mut self, expire: Duration) -> Self {
        self.conn_expire = (!expire.is_zero()).then_some(expire);
        self
    }

    /// Retire connections used more than `max_usage` times. Zero disables the cap.
    pub fn with_conn_max_usage(mut self, max_usage: u64) -> Self {
        self.conn_max_usage = (max_usage != 0).then_some(max_usage);
        self
    }

    /// Set the retirement jitter ratio, clamped to `[0, 1]`
    pub fn with_drop_conn_threshold(mut self, threshold: f64) -> Self {
        self.drop_conn_threshold = clamp_drop_threshold(threshold);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }
}
