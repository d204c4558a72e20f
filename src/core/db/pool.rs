/// Connection Pool Module
///
/// A bounded set of SQLite connections lent out one operation at a time,
/// built on `r2d2` with the `r2d2_sqlite` manager. Every new connection runs
/// the same initializer: busy timeout, foreign keys, then the configured
/// `init_sql`. Leases are RAII guards, so a connection goes back to the pool
/// on every exit path, including unwinding panics.
///
/// An in-memory database lives inside a single connection, so a `:memory:`
/// pool always holds exactly one. Concurrent callers queue on it instead of
/// racing on shared-cache table locks.

use crate::core::{ClubhouseError, Result};
use r2d2::ManageConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Path that selects a private in-memory database owned by the pool
pub const MEMORY_PATH: &str = ":memory:";

/// Lower bound for r2d2's own connection timeout, which also bounds how long
/// construction waits for the eager `min_idle` connections.
const INIT_TIMEOUT: Duration = Duration::from_secs(1);

type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

/// Sizing and timeout settings for a pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Upper bound on open connections
    pub max_size: usize,
    /// Idle connections kept open, starting at construction
    pub min_idle: usize,
    /// How long `acquire` waits for a free connection
    pub acquire_timeout: Duration,
    /// SQLite busy timeout applied to every connection
    pub statement_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_size: 10,
            min_idle: 1,
            acquire_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

/// Where and how connections are opened
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionOptions {
    /// Database file path, or `:memory:`
    pub path: String,
    /// SQL batch run on every new connection after the pragmas
    pub init_sql: Option<String>,
}

impl ConnectionOptions {
    pub fn new(path: impl Into<String>) -> Self {
        ConnectionOptions {
            path: path.into(),
            init_sql: None,
        }
    }

    pub fn in_memory() -> Self {
        ConnectionOptions::new(MEMORY_PATH)
    }

    pub fn with_init_sql(mut self, sql: impl Into<String>) -> Self {
        self.init_sql = Some(sql.into());
        self
    }

    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }

    /// Builds the r2d2 manager whose initializer prepares every connection.
    fn manager(&self, statement_timeout: Duration) -> SqliteConnectionManager {
        let manager = if self.is_memory() {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(&self.path)
        };
        let init_sql = self.init_sql.clone();
        manager.with_init(move |conn| {
            conn.busy_timeout(statement_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            if let Some(sql) = &init_sql {
                conn.execute_batch(sql)?;
            }
            debug!("Initialized pooled connection");
            Ok(())
        })
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    pub open: usize,
    pub idle: usize,
    pub leased: usize,
    /// Leases that could be granted right now: `max_size - leased`
    pub available: usize,
}

/// Bounded connection pool
///
/// Construct one at startup and share it behind an `Arc`.
pub struct ConnectionPool {
    config: PoolConfig,
    options: ConnectionOptions,
    /// `None` once the pool is closed
    inner: RwLock<Option<SqlitePool>>,
    leased: AtomicUsize,
}

impl ConnectionPool {
    /// Creates a pool and opens `min_idle` connections up front.
    ///
    /// # Errors
    ///
    /// Returns `ClubhouseError::Config` for a zero-sized pool and
    /// `ClubhouseError::Database` if a connection cannot be opened or its
    /// `init_sql` fails.
    pub fn new(config: PoolConfig, options: ConnectionOptions) -> Result<Self> {
        if config.max_size == 0 {
            return Err(ClubhouseError::Config("pool max_size must be at least 1".to_string()));
        }
        if config.min_idle > config.max_size {
            return Err(ClubhouseError::Config(format!(
                "pool min_idle ({}) exceeds max_size ({})",
                config.min_idle, config.max_size
            )));
        }

        let config = if options.is_memory() {
            if config.max_size > 1 {
                warn!(
                    "In-memory database is served by one connection (max_size {} ignored)",
                    config.max_size
                );
            }
            PoolConfig {
                max_size: 1,
                min_idle: 1,
                ..config
            }
        } else {
            config
        };

        let manager = options.manager(config.statement_timeout);
        // Surface a bad path or broken init_sql as a driver error rather
        // than as a pool timeout.
        drop(manager.connect()?);

        let pool = r2d2::Pool::builder()
            .max_size(config.max_size as u32)
            .min_idle(Some(config.min_idle as u32))
            .connection_timeout(config.acquire_timeout.max(INIT_TIMEOUT))
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        info!(
            "Connection pool ready for {} (max_size={}, min_idle={})",
            options.path, config.max_size, config.min_idle
        );
        Ok(ConnectionPool {
            config,
            options,
            inner: RwLock::new(Some(pool)),
            leased: AtomicUsize::new(0),
        })
    }

    /// Creates a pool over a private in-memory database.
    pub fn in_memory(config: PoolConfig) -> Result<Self> {
        ConnectionPool::new(config, ConnectionOptions::in_memory())
    }

    /// Effective settings; a `:memory:` pool reports `max_size` 1.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Leases a connection, waiting up to the configured acquire timeout.
    pub fn acquire(&self) -> Result<PooledConnection<'_>> {
        self.acquire_timeout(self.config.acquire_timeout)
    }

    /// Leases a connection, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// - `ClubhouseError::PoolExhausted` when no connection frees up in time
    /// - `ClubhouseError::PoolClosed` after [`ConnectionPool::close`]
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<'_>> {
        let pool = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClubhouseError::PoolClosed)?;

        match pool.get_timeout(timeout) {
            Ok(conn) => {
                let leased = self.leased.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("Leased connection ({} leased)", leased);
                Ok(PooledConnection {
                    pool: self,
                    conn: Some(conn),
                })
            }
            Err(e) => {
                warn!(
                    "Connection pool exhausted: {} of {} connections leased ({})",
                    self.leased.load(Ordering::SeqCst),
                    self.config.max_size,
                    e
                );
                Err(ClubhouseError::PoolExhausted { waited: timeout })
            }
        }
    }

    /// Returns a leased connection to the pool.
    ///
    /// Equivalent to dropping the guard; a guard is only ever released once.
    pub fn release(&self, conn: PooledConnection<'_>) {
        conn.release();
    }

    /// Runs `f` on a leased connection and releases it afterwards, whether
    /// `f` succeeds, fails or panics.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.acquire()?;
        f(&mut conn)
    }

    pub fn status(&self) -> PoolStatus {
        let leased = self.leased.load(Ordering::SeqCst);
        let (open, idle) = match &*self.inner.read().unwrap_or_else(PoisonError::into_inner) {
            Some(pool) => {
                let state = pool.state();
                (state.connections as usize, state.idle_connections as usize)
            }
            None => (leased, 0),
        };
        PoolStatus {
            max_size: self.config.max_size,
            open,
            idle,
            leased,
            available: self.config.max_size.saturating_sub(leased),
        }
    }

    /// Shuts the pool down. Idle connections close immediately, leased ones
    /// close when returned, and further acquires fail with `PoolClosed`.
    pub fn close(&self) {
        let closed = self.inner.write().unwrap_or_else(PoisonError::into_inner).take();
        drop(closed);
        info!(
            "Connection pool closed ({} leased connections outstanding)",
            self.leased.load(Ordering::SeqCst)
        );
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("path", &self.options.path)
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

/// A leased connection; returns itself to the pool when dropped
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<r2d2::PooledConnection<SqliteConnectionManager>>,
}

impl PooledConnection<'_> {
    /// Returns the connection to the pool now instead of at scope end.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        // A lease must never carry an open transaction into the next one.
        if !conn.is_autocommit() {
            warn!("Connection returned with an open transaction; rolling back");
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                warn!("Rollback on release failed: {}", e);
            }
        }
        drop(conn);
        let leased = self.pool.leased.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("Released connection ({} leased)", leased);
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `release_inner` empties the slot, and it runs at most once,
        // from `release(self)` or `drop`.
        self.conn.as_deref().expect("pooled connection used after release")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_deref_mut().expect("pooled connection used after release")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for PooledConnection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("path", &self.pool.options.path)
            .field("released", &self.conn.is_none())
            .finish()
    }
}
