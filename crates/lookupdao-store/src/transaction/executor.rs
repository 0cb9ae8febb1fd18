//! Generic transactional executor
//!
//! Runs one operation either inside a fresh lifecycle-managed unit of work
//! or against an ambient session that the caller already holds.

use super::handler::TransactionHandler;
use crate::db::ConnectionPool;
use crate::errors::{invalid_join, Result};
use crate::locks::RowLockTable;
use crate::session::Session;
use lookupdao_core::{log_op_end, log_op_error, log_op_start};
use std::sync::Arc;
use std::time::Instant;

/// Where an operation runs
pub enum Scope<'s> {
    /// Open, commit and close a new unit of work around the operation
    Complete { read_only: bool },
    /// Run inside an active session; the caller owns its lifecycle
    Join(&'s mut Session),
}

impl Scope<'_> {
    pub fn read_only() -> Self {
        Scope::Complete { read_only: true }
    }

    pub fn read_write() -> Self {
        Scope::Complete { read_only: false }
    }
}

/// Runs operations under transactions for one store
#[derive(Clone)]
pub struct TransactionExecutor {
    pool: Arc<ConnectionPool>,
    locks: Arc<RowLockTable>,
}

impl TransactionExecutor {
    pub fn new(pool: Arc<ConnectionPool>, locks: Arc<RowLockTable>) -> Self {
        Self { pool, locks }
    }

    /// Lifecycle handler over this executor's pool
    pub fn handler(&self, read_only: bool) -> TransactionHandler {
        TransactionHandler::new(Arc::clone(&self.pool), Arc::clone(&self.locks), read_only)
    }

    /// Run `operation(session, argument)` then `transform(result)`
    ///
    /// With [`Scope::Complete`] the unit of work is committed on success and
    /// handed to `on_error` on failure. The original error is returned either
    /// way.
    ///
    /// # Errors
    ///
    /// Whatever the operation or the transform returns, lifecycle failures,
    /// and an `Operation` error when joining a session that is inactive or
    /// belongs to another store.
    pub fn execute<A, R, V, F, H>(
        &self,
        op: &'static str,
        table: &'static str,
        scope: Scope<'_>,
        operation: F,
        argument: A,
        transform: H,
    ) -> Result<V>
    where
        F: FnOnce(&mut Session, A) -> Result<R>,
        H: FnOnce(R) -> Result<V>,
    {
        let start = Instant::now();
        log_op_start!(op, table = table);

        let result = match scope {
            Scope::Complete { read_only } => {
                let mut handler = self.handler(read_only);
                let outcome = handler
                    .before_start()
                    .and_then(|session| operation(session, argument))
                    .and_then(transform);
                match outcome {
                    Ok(value) => handler.after_end().map(|()| value),
                    Err(err) => {
                        handler.on_error(&err);
                        Err(err)
                    }
                }
            }
            Scope::Join(session) => self
                .check_joinable(session)
                .and_then(|()| operation(session, argument))
                .and_then(transform),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => log_op_end!(op, duration_ms = duration_ms, table = table),
            Err(err) => log_op_error!(op, err, duration_ms = duration_ms, table = table),
        }
        result
    }

    fn check_joinable(&self, session: &Session) -> Result<()> {
        if !session.belongs_to(&self.pool) {
            return Err(invalid_join("session belongs to a different store"));
        }
        if !session.is_active() {
            return Err(invalid_join("session has no active transaction"));
        }
        Ok(())
    }
}
