//! Scoped sessions
//!
//! A [`Session`] is one unit of work: a pooled connection with an explicit
//! transaction, the row locks taken during the unit of work, and snapshots of
//! the rows it has loaded or written. Dropping a session releases its locks
//! and returns the connection to the pool.
//!
//! A read-write session opens its SQLite transaction with `BEGIN IMMEDIATE`
//! on first use of the connection, after the operation has taken its row
//! locks. The read snapshot then always includes every earlier commit, and
//! waiting for the engine's single writer slot is bounded by `busy_timeout`.

use crate::db::{ConnectionPool, PooledConnection};
use crate::errors::{from_rusqlite, Result};
use crate::locks::{LockMode, RowKey, RowLockTable};
use lookupdao_core_types::SessionId;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One scoped unit of work
pub struct Session {
    id: SessionId,
    conn: PooledConnection,
    read_only: bool,
    // Write transaction begun but not yet issued to the engine
    pending_write: Cell<bool>,
    locks: Arc<RowLockTable>,
    lock_wait: Duration,
    tracked: HashMap<RowKey, Vec<Value>>,
}

impl Session {
    /// Take a connection from the pool; no transaction is started yet
    pub(crate) fn open(
        pool: &Arc<ConnectionPool>,
        locks: Arc<RowLockTable>,
        read_only: bool,
    ) -> Result<Self> {
        let conn = pool.acquire()?;
        let lock_wait = pool.config().lock_wait_timeout();
        Ok(Self {
            id: SessionId::new(),
            conn,
            read_only,
            pending_write: Cell::new(false),
            locks,
            lock_wait,
            tracked: HashMap::new(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The session's connection, starting a pending write transaction
    ///
    /// # Errors
    ///
    /// Fails when the engine's write lock is not granted within `busy_timeout`.
    pub fn connection(&self) -> Result<&Connection> {
        if self.pending_write.get() {
            self.conn
                .execute_batch("BEGIN IMMEDIATE")
                .map_err(from_rusqlite("session.begin"))?;
            self.pending_write.set(false);
        }
        Ok(&self.conn)
    }

    /// Apply the read-only flag to the connection
    pub(crate) fn configure(&mut self) -> Result<()> {
        let sql = if self.read_only {
            "PRAGMA query_only = 1"
        } else {
            "PRAGMA query_only = 0"
        };
        self.conn
            .execute_batch(sql)
            .map_err(from_rusqlite("session.configure"))
    }

    /// Open the unit of work; read-write sessions defer the engine transaction
    pub(crate) fn begin(&mut self) -> Result<()> {
        if !self.read_only {
            self.pending_write.set(true);
            return Ok(());
        }
        self.conn
            .execute_batch("BEGIN DEFERRED")
            .map_err(from_rusqlite("session.begin"))
    }

    pub(crate) fn commit(&mut self) -> Result<()> {
        if self.pending_write.replace(false) {
            return Ok(());
        }
        self.conn
            .execute_batch("COMMIT")
            .map_err(from_rusqlite("session.commit"))
    }

    pub(crate) fn rollback(&mut self) -> Result<()> {
        if self.pending_write.replace(false) {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(from_rusqlite("session.rollback"))
    }

    /// Whether a transaction is open on the connection
    pub fn is_active(&self) -> bool {
        self.pending_write.get() || !self.conn.is_autocommit()
    }

    pub(crate) fn belongs_to(&self, pool: &Arc<ConnectionPool>) -> bool {
        self.conn.is_from(pool)
    }

    /// Acquire a row lock according to `mode`
    pub fn lock(&mut self, key: RowKey, mode: LockMode) -> Result<()> {
        match mode {
            LockMode::Shared => Ok(()),
            LockMode::ExclusiveNoWait => self.locks.try_lock_exclusive(key, self.id),
        }
    }

    /// Exclusive lock for a write by identifier, waiting out other holders
    pub fn lock_for_write(&mut self, key: RowKey) -> Result<()> {
        self.locks.lock_exclusive(key, self.id, self.lock_wait)
    }

    pub(crate) fn unlock(&mut self, key: RowKey) {
        self.locks.unlock(key, self.id);
    }

    /// Whether this session holds the exclusive lock on `key`
    pub fn holds_lock(&self, key: RowKey) -> bool {
        self.locks.holder(key) == Some(self.id)
    }

    /// Record the stored state of a row loaded or written in this session
    pub fn track(&mut self, key: RowKey, values: Vec<Value>) {
        self.tracked.insert(key, values);
    }

    pub fn snapshot(&self, key: RowKey) -> Option<&[Value]> {
        self.tracked.get(&key).map(Vec::as_slice)
    }

    pub fn is_tracked(&self, key: RowKey) -> bool {
        self.tracked.contains_key(&key)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let released = self.locks.release_all(self.id);
        if released > 0 {
            tracing::trace!(
                component = module_path!(),
                session_id = %self.id,
                released,
                "released row locks"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("read_only", &self.read_only)
            .field("active", &self.is_active())
            .field("tracked", &self.tracked.len())
            .finish()
    }
}
