//! Database connection management
//!
//! Opens and configures SQLite connections and keeps them in a sized pool.
//! Connections are handed out as [`PooledConnection`]s that return
//! themselves to the pool on drop.

use crate::errors::{from_rusqlite, pool_closed, pool_exhausted, Result};
use lookupdao_core::DbConfig;
use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Open a SQLite database at the given path and configure it
pub fn open<P: AsRef<Path>>(path: P, config: &DbConfig) -> Result<Connection> {
    let mut conn = Connection::open(path).map_err(from_rusqlite("db.open"))?;
    configure(&mut conn, config)?;
    Ok(conn)
}

/// Configure a connection for pooled, lock-aware use
pub fn configure(conn: &mut Connection, config: &DbConfig) -> Result<()> {
    conn.busy_timeout(config.lock_wait_timeout())
        .map_err(from_rusqlite("db.configure"))?;

    // WAL lets readers proceed while another session holds the write lock
    let mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(from_rusqlite("db.configure"))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(component = module_path!(), journal_mode = %mode, "WAL not available");
    }
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(from_rusqlite("db.configure"))?;

    if config.show_sql {
        conn.trace(Some(log_statement));
    }

    Ok(())
}

fn log_statement(sql: &str) {
    tracing::debug!(component = module_path!(), sql = sql, "executing statement");
}

struct PoolSlot {
    conn: Connection,
    created_at: Instant,
    last_used: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<PoolSlot>,
    total: usize,
    closed: bool,
}

/// Sized pool of configured connections to one database file
pub struct ConnectionPool {
    config: DbConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl ConnectionPool {
    /// Create the pool and open `min_pool_size` connections up front
    pub fn new(config: &DbConfig) -> Result<Arc<Self>> {
        let pool = Arc::new(Self {
            config: config.clone(),
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
        });

        for _ in 0..config.min_pool_size {
            let slot = pool.open_slot()?;
            let mut state = pool.state.lock();
            state.total += 1;
            state.idle.push(slot);
        }

        tracing::debug!(
            component = module_path!(),
            url = %config.url,
            database = ?config.database,
            min = config.min_pool_size,
            max = config.max_pool_size,
            "connection pool opened"
        );
        Ok(pool)
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Connections currently open, idle or in use
    pub fn size(&self) -> usize {
        self.state.lock().total
    }

    pub fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Take a connection, waiting up to `connection_timeout_ms` for one to free up
    pub fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let deadline = Instant::now() + self.config.connection_timeout();
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(pool_closed());
            }

            while let Some(slot) = state.idle.pop() {
                if self.is_expired(&slot, state.total) {
                    state.total -= 1;
                    tracing::debug!(component = module_path!(), "evicted expired connection");
                    continue;
                }
                if !self.is_alive(&slot.conn) {
                    state.total -= 1;
                    tracing::warn!(component = module_path!(), "discarded connection failing test query");
                    continue;
                }
                return Ok(self.hand_out(slot));
            }

            if state.total < self.config.max_pool_size {
                state.total += 1;
                drop(state);
                return match self.open_slot() {
                    Ok(slot) => Ok(self.hand_out(slot)),
                    Err(err) => {
                        self.state.lock().total -= 1;
                        self.available.notify_one();
                        Err(err)
                    }
                };
            }

            let timed_out = self.available.wait_until(&mut state, deadline).timed_out();
            if timed_out && state.idle.is_empty() && state.total >= self.config.max_pool_size {
                return Err(pool_exhausted(self.config.connection_timeout_ms));
            }
        }
    }

    /// Drop idle connections and refuse further acquisitions
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let dropped = state.idle.len();
        state.total -= dropped;
        state.idle.clear();
        drop(state);
        self.available.notify_all();
        tracing::debug!(component = module_path!(), dropped, "connection pool closed");
    }

    fn hand_out(self: &Arc<Self>, slot: PoolSlot) -> PooledConnection {
        PooledConnection {
            slot: Some(slot),
            pool: Arc::clone(self),
        }
    }

    fn open_slot(&self) -> Result<PoolSlot> {
        let conn = open(&self.config.url, &self.config)?;
        let now = Instant::now();
        Ok(PoolSlot {
            conn,
            created_at: now,
            last_used: now,
        })
    }

    fn is_expired(&self, slot: &PoolSlot, total: usize) -> bool {
        let too_old = slot.created_at.elapsed() >= self.config.max_age();
        let idle_too_long = total > self.config.min_pool_size
            && slot.last_used.elapsed() >= self.config.idle_timeout();
        too_old || idle_too_long
    }

    fn is_alive(&self, conn: &Connection) -> bool {
        match self.config.test_query.as_deref() {
            Some(query) if !query.trim().is_empty() => {
                conn.query_row(query, [], |_| Ok(())).is_ok()
            }
            _ => true,
        }
    }

    fn release(&self, mut slot: PoolSlot) {
        // A transaction left open (skipped rollback) is reset before reuse
        if !slot.conn.is_autocommit() {
            if let Err(err) = slot.conn.execute_batch("ROLLBACK") {
                tracing::warn!(
                    component = module_path!(),
                    error = %err,
                    "discarding connection whose open transaction could not be reset"
                );
                self.discard();
                return;
            }
            tracing::debug!(component = module_path!(), "reset open transaction on returned connection");
        }

        slot.last_used = Instant::now();
        let mut state = self.state.lock();
        if state.closed || slot.created_at.elapsed() >= self.config.max_age() {
            state.total -= 1;
        } else {
            state.idle.push(slot);
        }
        drop(state);
        self.available.notify_one();
    }

    fn discard(&self) {
        self.state.lock().total -= 1;
        self.available.notify_one();
    }
}

/// A connection on loan from the pool
pub struct PooledConnection {
    // Only taken in Drop
    slot: Option<PoolSlot>,
    pool: Arc<ConnectionPool>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Whether this connection came from `pool`
    pub fn is_from(&self, pool: &Arc<ConnectionPool>) -> bool {
        Arc::ptr_eq(&self.pool, pool)
    }

    pub fn pool_config(&self) -> &DbConfig {
        &self.pool.config
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.slot {
            Some(slot) => &slot.conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release(slot);
        }
    }
}
