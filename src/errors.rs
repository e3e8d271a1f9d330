//! Error types for the connection pool

use std::sync::Arc;
use thiserror::Error;

/// Error raised by a client's close/reset behavior or by a connection factory
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    /// No idle connection and the in-use count is at the configured limit
    #[error("Exceeded max pool limit of {0} connections")]
    CapacityExceeded(usize),

    /// The factory could not create a connection
    #[error("Failed to create connection: {0}")]
    Factory(#[source] Arc<dyn std::error::Error + Send + Sync>),

    #[error("Operation was cancelled")]
    Cancelled,
}

impl PoolError {
    pub(crate) fn factory(err: BoxError) -> Self {
        PoolError::Factory(Arc::from(err))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
