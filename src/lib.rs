//! # Esox ConnectionPool
//!
//! Thread-safe pool for reusable, expensive-to-create client connections
//! (database sessions, RPC channels).
//!
//! ## Features
//!
//! - Non-blocking acquire/release with a capacity limit on checked-out connections
//! - Connections created on demand by a caller-supplied factory
//! - Epoch-based bulk invalidation: bump the version, stale connections are
//!   dropped lazily on the next acquire
//! - Jittered retirement of connections by age and by usage count
//! - Typed per-checkout session payload, cleared on every reset
//! - Scoped client guards that release on drop
//! - Pool warm-up and idle drain
//! - Metrics, Prometheus export and health reporting
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_connpool::{BoxError, Client, Connection, Lifecycle, Pool};
//! use std::sync::Arc;
//!
//! struct DbClient {
//!     open: bool,
//! }
//!
//! impl Lifecycle for DbClient {
//!     fn close(&mut self) -> Result<(), BoxError> {
//!         self.open = false;
//!         Ok(())
//!     }
//!
//!     fn is_closed(&self) -> bool {
//!         !self.open
//!     }
//! }
//!
//! let pool: Arc<Pool<DbClient>> = Arc::new(Pool::new("orders-db", 8, |pool: &Pool<DbClient>| {
//!     Ok(Connection::new(DbClient { open: true }, pool.version()))
//! }));
//!
//! let client = Client::new("orders", Arc::clone(&pool));
//! {
//!     let db = client.get_client().unwrap();
//!     assert!(db.open);
//!     // Connection goes back to the pool when `db` goes out of scope
//! }
//! assert_eq!(pool.len(), 1);
//! ```

mod client;
mod config;
mod connection;
mod errors;
mod health;
mod metrics;
mod pool;
mod registry;
mod retirement;
mod ring;

pub use client::{Client, PooledClient};
pub use config::{DEFAULT_DROP_CONN_THRESHOLD, PoolConfiguration};
pub use connection::{Connection, Lifecycle};
pub use errors::{BoxError, PoolError, PoolResult};
pub use health::HealthStatus;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::{PoolMetrics, Statistics};
pub use pool::{Factory, Pool};
pub use registry::PoolRegistry;
pub use retirement::RetirementPolicy;
