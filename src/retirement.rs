//! Retirement policy for aged and overused connections
//!
//! Both limits are softened by a random jitter drawn from a window of
//! `limit * drop_conn_threshold`, so connections created around the same time
//! do not all retire at once.

use rand::Rng;
use std::time::Duration;

/// Snapshot of a pool's retirement settings
///
/// # Examples
///
/// ```
/// use esox_connpool::RetirementPolicy;
/// use std::time::Duration;
///
/// let policy = RetirementPolicy {
///     conn_expire: Some(Duration::from_secs(60)),
///     conn_max_usage: None,
///     drop_conn_threshold: 0.1,
/// };
///
/// assert!(!policy.is_expired(Duration::from_secs(10)));
/// assert!(policy.is_expired(Duration::from_secs(61)));
/// assert!(!policy.is_overused(u64::MAX));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetirementPolicy {
    /// Maximum connection age
    pub conn_expire: Option<Duration>,

    /// Maximum number of acquire/release cycles
    pub conn_max_usage: Option<u64>,

    /// Fraction of each limit used as the jitter window
    pub drop_conn_threshold: f64,
}

/// Bring a jitter ratio into `[0, 1]`. NaN counts as no jitter.
pub(crate) fn clamp_drop_threshold(threshold: f64) -> f64 {
    if threshold.is_nan() {
        0.0
    } else {
        threshold.clamp(0.0, 1.0)
    }
}

impl RetirementPolicy {
    /// Whether a connection of the given age should be retired.
    ///
    /// Retires when `age > conn_expire - jitter`, jitter uniform in
    /// `[0, conn_expire * drop_conn_threshold]`.
    pub fn is_expired(&self, age: Duration) -> bool {
        let Some(expire) = self.conn_expire else {
            return false;
        };
        let window = expire.as_secs_f64() * clamp_drop_threshold(self.drop_conn_threshold);
        let jitter = if window > 0.0 {
            Duration::try_from_secs_f64(rand::thread_rng().gen_range(0.0..=window))
                .unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        age > expire.saturating_sub(jitter)
    }

    /// Whether a connection with the given usage count should be retired.
    ///
    /// Retires when `usage > conn_max_usage - jitter`, jitter uniform in
    /// `[0, conn_max_usage * drop_conn_threshold]`.
    pub fn is_overused(&self, usage: u64) -> bool {
        let Some(max_usage) = self.conn_max_usage else {
            return false;
        };
        let window = (max_usage as f64 * clamp_drop_threshold(self.drop_conn_threshold)) as u64;
        let jitter = if window > 0 {
            rand::thread_rng().gen_range(0..=window)
        } else {
            0
        };
        usage > max_usage.saturating_sub(jitter)
    }
}

impl Default for RetirementPolicy {
    fn default() -> Self {
        Self {
            conn_expire: None,
            conn_max_usage: None,
            drop_conn_threshold: crate::config::DEFAULT_DROP_CONN_THRESHOLD,
        }
    }
}
