//! In-process row locks
//!
//! SQLite only locks whole databases, so row-level pessimistic locking is
//! provided here. A lock belongs to a session and is held until the session
//! closes. Locks are reentrant for their holder.

use crate::errors::{lock_not_available, Result};
use lookupdao_core_types::SessionId;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// How a read by identifier treats row locks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Plain read; never waits on or takes a row lock
    Shared,
    /// Take the exclusive row lock or fail at once with `LockNotAvailable`
    ExclusiveNoWait,
}

/// Identity of one stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub table: &'static str,
    pub id: i64,
}

impl RowKey {
    pub fn new(table: &'static str, id: i64) -> Self {
        Self { table, id }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table, self.id)
    }
}

/// Exclusive row locks shared by every session of one store
#[derive(Default)]
pub struct RowLockTable {
    held: Mutex<HashMap<RowKey, SessionId>>,
    released: Condvar,
}

impl RowLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `session` or fail immediately
    pub fn try_lock_exclusive(&self, key: RowKey, session: SessionId) -> Result<()> {
        let mut held = self.held.lock();
        match held.get(&key) {
            Some(holder) if *holder != session => Err(lock_not_available(key.table, key.id)),
            _ => {
                held.insert(key, session);
                Ok(())
            }
        }
    }

    /// Take the lock for `session`, waiting up to `timeout` for its holder to finish
    pub fn lock_exclusive(&self, key: RowKey, session: SessionId, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        loop {
            match held.get(&key) {
                Some(holder) if *holder != session => {
                    if self.released.wait_until(&mut held, deadline).timed_out()
                        && held.get(&key).is_some_and(|h| *h != session)
                    {
                        return Err(lock_not_available(key.table, key.id));
                    }
                }
                _ => {
                    held.insert(key, session);
                    return Ok(());
                }
            }
        }
    }

    /// Drop one lock if `session` holds it
    pub fn unlock(&self, key: RowKey, session: SessionId) {
        let mut held = self.held.lock();
        if held.get(&key) == Some(&session) {
            held.remove(&key);
            drop(held);
            self.released.notify_all();
        }
    }

    /// Drop every lock `session` holds, returning how many were released
    pub fn release_all(&self, session: SessionId) -> usize {
        let mut held = self.held.lock();
        let before = held.len();
        held.retain(|_, holder| *holder != session);
        let released = before - held.len();
        drop(held);
        if released > 0 {
            self.released.notify_all();
        }
        released
    }

    /// Session currently holding `key`
    pub fn holder(&self, key: RowKey) -> Option<SessionId> {
        self.held.lock().get(&key).copied()
    }

    /// Number of locks held by `session`
    pub fn held_by(&self, session: SessionId) -> usize {
        self.held.lock().values().filter(|h| **h == session).count()
    }
}
