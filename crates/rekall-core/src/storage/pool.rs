//! SQLite Connection Pooling
//!
//! Bounded, thread-safe reuse of SQLite connections. Connections are
//! created lazily up to `pool_size`, configured for WAL mode, and handed
//! out as [`PooledConnection`] guards that return themselves to the pool
//! on drop after rolling back any open transaction.
//!
//! A [`PoolRegistry`] deduplicates pools by resolved database path so
//! `./intelligence.db` and its absolute form share one pool.

use rusqlite::Connection;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Pool error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Checkout exceeded the configured timeout
    #[error("Could not get database connection within {waited_ms}ms ({in_use} connections in use)")]
    Timeout {
        /// Milliseconds waited before giving up
        waited_ms: u128,
        /// Connections currently checked out
        in_use: usize,
    },
    /// Underlying driver error (invalid path, corrupt database, ...)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Pool result type
pub type Result<T> = std::result::Result<T, PoolError>;

// ============================================================================
// CONNECTION POOL
// ============================================================================

struct PoolState {
    idle: Vec<Connection>,
    created: usize,
}

/// Bounded pool of SQLite connections for one database file.
pub struct ConnectionPool {
    db_path: PathBuf,
    pool_size: usize,
    timeout: Duration,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl ConnectionPool {
    /// Create a pool for `db_path`. No connections are opened until the
    /// first checkout.
    pub fn new(db_path: impl Into<PathBuf>, pool_size: usize, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            db_path: db_path.into(),
            pool_size: pool_size.max(1),
            timeout,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                created: 0,
            }),
            available: Condvar::new(),
        })
    }

    /// The database path this pool serves.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Configured maximum number of connections.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of connections created so far (idle + checked out).
    pub fn created(&self) -> usize {
        self.state.lock().expect("pool lock poisoned").created
    }

    /// Apply the standard pragmas to a fresh connection.
    fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -10000;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
    }

    /// Check out a connection, waiting up to the pool's configured timeout.
    pub fn checkout(self: &Arc<Self>) -> Result<PooledConnection> {
        self.checkout_timeout(self.timeout)
    }

    /// Check out a connection, waiting up to `timeout` for one to free up.
    ///
    /// Creates a new connection when the pool is below `pool_size`; blocks
    /// otherwise. Fails with [`PoolError::Timeout`] when the wait expires.
    pub fn checkout_timeout(self: &Arc<Self>, timeout: Duration) -> Result<PooledConnection> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().expect("pool lock poisoned");

        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection::new(conn, Arc::clone(self)));
            }

            if state.created < self.pool_size {
                // Reserve the slot, then open outside the lock.
                state.created += 1;
                drop(state);

                match self.open_connection() {
                    Ok(conn) => return Ok(PooledConnection::new(conn, Arc::clone(self))),
                    Err(e) => {
                        let mut state = self.state.lock().expect("pool lock poisoned");
                        state.created -= 1;
                        self.available.notify_one();
                        return Err(e);
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let in_use = state.created - state.idle.len();
                return Err(PoolError::Timeout {
                    waited_ms: timeout.as_millis(),
                    in_use,
                });
            }

            let (guard, wait) = self
                .available
                .wait_timeout(state, deadline - now)
                .expect("pool lock poisoned");
            state = guard;

            if wait.timed_out() && state.idle.is_empty() && state.created >= self.pool_size {
                let in_use = state.created - state.idle.len();
                return Err(PoolError::Timeout {
                    waited_ms: timeout.as_millis(),
                    in_use,
                });
            }
        }
    }

    fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        Self::configure_connection(&conn)?;
        Ok(conn)
    }

    /// Return a connection to the idle set, rolling back any transaction
    /// left open by the borrower. Rollback failures on a broken connection
    /// are swallowed.
    fn give_back(&self, conn: Connection) {
        let _ = conn.execute_batch("ROLLBACK;");

        let mut state = self.state.lock().expect("pool lock poisoned");
        state.idle.push(conn);
        drop(state);
        self.available.notify_one();
    }

    /// Drain and close every idle connection and reset the created counter.
    /// The pool remains usable; the next checkout opens fresh connections.
    pub fn close_all(&self) {
        let mut state = self.state.lock().expect("pool lock poisoned");
        state.idle.clear();
        state.created = 0;
        drop(state);
        self.available.notify_all();
    }
}

// ============================================================================
// POOLED CONNECTION
// ============================================================================

/// A checked-out connection. Derefs to [`rusqlite::Connection`]; dropping
/// it returns the underlying connection to its pool instead of closing it.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPool>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn.is_some())
            .finish()
    }
}

impl PooledConnection {
    fn new(conn: Connection, pool: Arc<ConnectionPool>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}

// ============================================================================
// POOL REGISTRY
// ============================================================================

/// Maps resolved database paths to their pools so relative and absolute
/// spellings of the same file share connections.
pub struct PoolRegistry {
    pool_size: usize,
    timeout: Duration,
    pools: Mutex<HashMap<PathBuf, Arc<ConnectionPool>>>,
}

impl PoolRegistry {
    /// Create a registry whose pools use `pool_size` and `timeout`.
    pub fn new(pool_size: usize, timeout: Duration) -> Self {
        Self {
            pool_size,
            timeout,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the pool for `db_path`.
    pub fn get(&self, db_path: impl AsRef<Path>) -> Arc<ConnectionPool> {
        let key = resolve_path(db_path.as_ref());
        let mut pools = self.pools.lock().expect("registry lock poisoned");
        Arc::clone(
            pools
                .entry(key.clone())
                .or_insert_with(|| ConnectionPool::new(key, self.pool_size, self.timeout)),
        )
    }

    /// Close every pool and clear the registry.
    pub fn close_all(&self) {
        let mut pools = self.pools.lock().expect("registry lock poisoned");
        for pool in pools.values() {
            pool.close_all();
        }
        pools.clear();
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.pools.lock().expect("registry lock poisoned").len()
    }

    /// True when no pools are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonicalize a database path. The file may not exist yet, so fall back
/// to canonicalizing the parent directory and re-joining the file name.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(resolved) = parent.canonicalize() {
            return resolved.join(name);
        }
    }
    path.to_path_buf()
}

// ============================================================================
// TESTS
// ============================================================================
