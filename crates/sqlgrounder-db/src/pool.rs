//! Connection pool for the two external SQL collaborators: the source ERP
//! database (read-only, queried by value verification) and the rag schema
//! store (vector + lexical retrieval backing S1/S2/S3).
//!
//! Both collaborators are reached through the same generic pool: neither this
//! crate nor the pipeline above it hardcodes a wire protocol or driver.
//! Callers supply a connect closure that produces a `C: Connection`; this
//! module only owns sizing, checkout bookkeeping, and circuit-breaker gating.

use crate::error::{DbError, DbResult};
use crate::retry::CircuitBreaker;
use asupersync::{Cx, Outcome};
use sqlmodel_core::{Connection, Error as SqlError};
use sqlmodel_pool::{Pool, PoolConfig, PooledConnection};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Default pool sizing: each pipeline run checks out at most one
/// source-database connection (S7 value verification) and a handful of
/// rag-store connections (S2/S3), so the concurrency ceiling tracks the
/// number of in-flight pipeline runs rather than a large agent population.
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_MAX_OVERFLOW: usize = 20;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_LIFETIME_MS: u64 = 30 * 60 * 1000;

/// Auto-detect a reasonable pool ceiling from available CPU parallelism.
#[must_use]
pub fn auto_pool_size() -> (usize, usize) {
    let cpus = std::thread::available_parallelism().map_or(4, std::num::NonZero::get);
    let min = (cpus * 2).clamp(4, 20);
    let max = (cpus * 6).clamp(10, 60);
    (min, max)
}

/// Configuration for a [`SourcePool`].
#[derive(Debug, Clone)]
pub struct SourcePoolConfig {
    pub database_url: String,
    pub min_connections: usize,
    pub max_connections: usize,
    pub acquire_timeout_ms: u64,
    pub max_lifetime_ms: u64,
}

impl SourcePoolConfig {
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        let (min, max) = auto_pool_size();
        Self {
            database_url: database_url.into(),
            min_connections: min,
            max_connections: max,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            max_lifetime_ms: DEFAULT_MAX_LIFETIME_MS,
        }
    }

    #[must_use]
    pub fn with_sizing(mut self, min_connections: usize, max_connections: usize) -> Self {
        self.min_connections = min_connections;
        self.max_connections = max_connections.max(min_connections);
        self
    }

    #[must_use]
    pub fn with_acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }
}

impl Default for SourcePoolConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            min_connections: DEFAULT_POOL_SIZE,
            max_connections: DEFAULT_POOL_SIZE + DEFAULT_MAX_OVERFLOW,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            max_lifetime_ms: DEFAULT_MAX_LIFETIME_MS,
        }
    }
}

type ConnectFuture<C> = Pin<Box<dyn Future<Output = Outcome<C, SqlError>> + Send>>;
type ConnectFn<C> = Arc<dyn Fn() -> ConnectFuture<C> + Send + Sync>;

/// A pooled handle to one of the external SQL collaborators.
///
/// Stage code checks a connection out for the duration of a single stage
/// call and lets it drop back into the pool on every exit path (including
/// cancellation and error returns), matching the checkout discipline of the
/// rest of the pipeline's cancellation-aware async style.
#[derive(Clone)]
pub struct SourcePool<C> {
    pool: Arc<Pool<C>>,
    connect: ConnectFn<C>,
    breaker: &'static CircuitBreaker,
    label: &'static str,
}

impl<C> SourcePool<C>
where
    C: Connection + Send + Sync + 'static,
{
    /// Build a pool from a connect closure. `breaker` is one of
    /// [`crate::retry::DB_CIRCUIT`] or [`crate::retry::SIDECAR_CIRCUIT`]
    /// (the rag store shares the source database's circuit in this design,
    /// since both live behind the same network boundary).
    pub fn new<F, Fut>(
        config: &SourcePoolConfig,
        label: &'static str,
        breaker: &'static CircuitBreaker,
        connect: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<C, SqlError>> + Send + 'static,
    {
        let pool_config = PoolConfig::new(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout_ms)
            .max_lifetime(config.max_lifetime_ms)
            .test_on_checkout(true)
            .test_on_return(false);

        Self {
            pool: Arc::new(Pool::new(pool_config)),
            connect: Arc::new(move || Box::pin(connect())),
            breaker,
            label,
        }
    }

    /// Check out a connection, gated by the collaborator's circuit breaker.
    pub async fn acquire(&self, cx: &Cx) -> DbResult<PooledConnection<C>> {
        self.breaker.check()?;

        let start = Instant::now();
        let connect = self.connect.clone();
        let out = self.pool.acquire(cx, move || connect()).await;
        let dur_us = u64::try_from(start.elapsed().as_micros().min(u128::from(u64::MAX)))
            .unwrap_or(u64::MAX);

        let metrics = sqlgrounder_core::global_metrics();
        metrics.db.pool_acquires_total.inc();
        metrics.db.pool_acquire_latency_us.record(dur_us);

        match out {
            Outcome::Ok(conn) => {
                self.breaker.record_success();
                self.sample_stats();
                Ok(conn)
            }
            Outcome::Err(e) => {
                self.breaker.record_failure();
                metrics.db.pool_acquire_errors_total.inc();
                Err(DbError::Driver(e.to_string()))
            }
            Outcome::Cancelled(_) => Err(DbError::Timeout {
                operation: "pool acquire",
                elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
            Outcome::Panicked(_) => Err(DbError::Internal(format!(
                "{} connection factory panicked",
                self.label
            ))),
        }
    }

    fn sample_stats(&self) {
        let stats = self.pool.stats();
        let metrics = sqlgrounder_core::global_metrics();
        metrics
            .db
            .pool_total_connections
            .set(u64::try_from(stats.total_connections).unwrap_or(u64::MAX));
        metrics
            .db
            .pool_idle_connections
            .set(u64::try_from(stats.idle_connections).unwrap_or(u64::MAX));
        metrics
            .db
            .pool_active_connections
            .set(u64::try_from(stats.active_connections).unwrap_or(u64::MAX));
        metrics
            .db
            .pool_pending_requests
            .set(u64::try_from(stats.pending_requests).unwrap_or(u64::MAX));
        metrics
            .db
            .pool_peak_active_connections
            .fetch_max(u64::try_from(stats.active_connections).unwrap_or(u64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_pool_size_keeps_min_below_max() {
        let (min, max) = auto_pool_size();
        assert!(min <= max);
        assert!(min >= 4);
    }

    #[test]
    fn config_with_sizing_clamps_max_to_min() {
        let cfg = SourcePoolConfig::new("postgres://x").with_sizing(10, 3);
        assert_eq!(cfg.min_connections, 10);
        assert_eq!(cfg.max_connections, 10);
    }

    #[test]
    fn acquire_against_real_sqlite_file_succeeds() {
        use crate::retry::DB_CIRCUIT;
        use asupersync::runtime::RuntimeBuilder;
        use sqlmodel_sqlite::SqliteConnection;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("pool_test.sqlite3");
        let config = SourcePoolConfig::new(db_path.display().to_string()).with_sizing(1, 2);
        let pool: SourcePool<SqliteConnection> = SourcePool::new(&config, "test_pool", &DB_CIRCUIT, {
            let db_path = db_path.clone();
            move || {
                let db_path = db_path.clone();
                async move {
                    match SqliteConnection::open_file(db_path.display().to_string()) {
                        Ok(conn) => Outcome::Ok(conn),
                        Err(e) => Outcome::Err(e),
                    }
                }
            }
        });

        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        let conn = rt.block_on(pool.acquire(&cx)).expect("acquire should succeed");
        let rows = conn.query_sync("SELECT 1 AS val", &[]).expect("query should succeed");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn acquire_reports_driver_error_for_unopenable_path() {
        use crate::retry::DB_CIRCUIT;
        use asupersync::runtime::RuntimeBuilder;
        use sqlmodel_sqlite::SqliteConnection;

        let config = SourcePoolConfig::new("/nonexistent/dir/that/does/not/exist/db.sqlite3")
            .with_sizing(1, 1);
        let url = config.database_url.clone();
        let pool: SourcePool<SqliteConnection> = SourcePool::new(&config, "test_pool", &DB_CIRCUIT, {
            move || {
                let url = url.clone();
                async move {
                    match SqliteConnection::open_file(&url) {
                        Ok(conn) => Outcome::Ok(conn),
                        Err(e) => Outcome::Err(e),
                    }
                }
            }
        });

        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        let result = rt.block_on(pool.acquire(&cx));
        assert!(result.is_err(), "opening an unopenable path should fail");
    }
}
