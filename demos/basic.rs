//! Basic usage examples for the connection pool

use esox_connpool::{BoxError, Client, Connection, Lifecycle, Pool, PoolConfiguration};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Stand-in for a database session
struct DbSession {
    id: usize,
    open: bool,
    in_transaction: bool,
}

impl Lifecycle for DbSession {
    fn close(&mut self) -> Result<(), BoxError> {
        self.open = false;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), BoxError> {
        // Roll back anything the previous borrower left open
        self.in_transaction = false;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        !self.open
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    println!("=== Esox ConnectionPool - Basic Examples ===\n");

    let config = PoolConfiguration::new()
        .with_capacity(3)
        .with_conn_expire(Duration::from_secs(300))
        .with_conn_max_usage(1000)
        .with_description("demo database");

    let created = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let pool = Arc::new(Pool::with_config("demo-db", config, move |pool: &Pool<DbSession>| {
        let id = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(Connection::new(
            DbSession {
                id,
                open: true,
                in_transaction: false,
            },
            pool.version(),
        ))
    }));

    scoped_clients(&pool);
    capacity_limit(&pool);
    version_bump(&pool);
    metrics_and_health(&pool);
}

fn scoped_clients(pool: &Arc<Pool<DbSession>>) {
    println!("1. Scoped clients:");
    let client = Client::new("orders", Arc::clone(pool));

    {
        let mut session = client.get_client().unwrap();
        session.in_transaction = true;
        println!("   Using session {}", session.id);
    }

    let session = client.get_client().unwrap();
    println!(
        "   Reused session {} (in transaction: {})",
        session.id, session.in_transaction
    );
    drop(session);
    println!("   Idle after return: {}\n", pool.len());
}

fn capacity_limit(pool: &Arc<Pool<DbSession>>) {
    println!("2. Capacity limit:");
    let held: Vec<_> = (0..pool.capacity()).map(|_| pool.acquire().unwrap()).collect();
    match pool.acquire() {
        Ok(_) => println!("   Unexpected: got a connection beyond capacity"),
        Err(err) => println!("   Rejected: {}", err),
    }
    for conn in held {
        pool.release(conn);
    }
    println!("   Idle after releasing all: {}\n", pool.len());
}

fn version_bump(pool: &Arc<Pool<DbSession>>) {
    println!("3. Version bump:");
    pool.incr_version();
    let conn = pool.acquire().unwrap();
    println!(
        "   Fresh session {} on version {} (idle left: {})",
        conn.client().id,
        conn.version(),
        pool.len()
    );
    pool.release(conn);
    println!();
}

fn metrics_and_health(pool: &Arc<Pool<DbSession>>) {
    println!("4. Metrics and Health:");
    let health = pool.get_health_status();
    println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
    println!("   Utilization: {:.1}%", health.utilization * 100.0);

    let mut metrics: Vec<_> = pool.export_metrics().into_iter().collect();
    metrics.sort();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
}
