//! Transaction lifecycle manager
//!
//! One [`TransactionHandler`] drives one unit of work through
//! `Idle → Active → Committed | RolledBack`. It is the explicit binding
//! between the caller and its session: whoever holds the handler holds the
//! session, and nothing is kept in thread-local state.

use crate::db::ConnectionPool;
use crate::errors::Result;
use crate::locks::RowLockTable;
use crate::session::Session;
use lookupdao_core::errors::DaoError;
use lookupdao_core::{log_op_end, log_op_error, log_op_start};
use lookupdao_core_types::schema::{
    OP_TX_BEGIN, OP_TX_COMMIT, OP_TX_ROLLBACK, OP_TX_ROLLBACK_SKIPPED,
};
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Active,
    Committed,
    RolledBack,
}

/// Opens, commits or rolls back, and always closes one unit of work
pub struct TransactionHandler {
    pool: Arc<ConnectionPool>,
    locks: Arc<RowLockTable>,
    read_only: bool,
    session: Option<Session>,
    state: TransactionState,
    started: Option<Instant>,
}

impl TransactionHandler {
    pub fn new(pool: Arc<ConnectionPool>, locks: Arc<RowLockTable>, read_only: bool) -> Self {
        Self {
            pool,
            locks,
            read_only,
            session: None,
            state: TransactionState::Idle,
            started: None,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Session bound to this handler, if one is open
    pub fn session(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Acquire a session, configure it, bind it and begin a transaction
    ///
    /// # Errors
    ///
    /// Propagates pool exhaustion and engine failures. When a step after
    /// acquisition fails the session is closed before returning.
    pub fn before_start(&mut self) -> Result<&mut Session> {
        let mut session = Session::open(&self.pool, Arc::clone(&self.locks), self.read_only)?;
        let started = Instant::now();

        // The session is dropped (closed) on either failure
        session.configure()?;
        session.begin()?;

        log_op_start!(
            OP_TX_BEGIN,
            session_id = %session.id(),
            read_only = self.read_only
        );
        self.started = Some(started);
        self.state = TransactionState::Active;
        Ok(self.session.insert(session))
    }

    /// Commit if a transaction is active, then close the session
    ///
    /// # Errors
    ///
    /// Returns the commit error after rolling back.
    pub fn after_end(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        if !session.is_active() {
            return Ok(());
        }

        match session.commit() {
            Ok(()) => {
                self.state = TransactionState::Committed;
                log_op_end!(
                    OP_TX_COMMIT,
                    duration_ms = self.elapsed_ms(),
                    session_id = %session.id()
                );
                Ok(())
            }
            Err(err) => {
                log_op_error!(
                    OP_TX_COMMIT,
                    err,
                    duration_ms = self.elapsed_ms(),
                    session_id = %session.id()
                );
                self.roll_back(&mut session);
                Err(err)
            }
        }
    }

    /// Roll back unless `err` is a uniqueness violation, then close the session
    pub fn on_error(&mut self, err: &DaoError) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if err.is_constraint_violation() {
            tracing::debug!(
                component = module_path!(),
                op = OP_TX_ROLLBACK_SKIPPED,
                event = lookupdao_core_types::schema::EVENT_END,
                session_id = %session.id(),
                err_code = err.code(),
            );
            self.state = TransactionState::RolledBack;
            return;
        }

        if session.is_active() {
            self.roll_back(&mut session);
        }
    }

    fn roll_back(&mut self, session: &mut Session) {
        match session.rollback() {
            Ok(()) => log_op_end!(
                OP_TX_ROLLBACK,
                duration_ms = self.elapsed_ms(),
                session_id = %session.id()
            ),
            Err(err) => log_op_error!(
                OP_TX_ROLLBACK,
                err,
                duration_ms = self.elapsed_ms(),
                session_id = %session.id()
            ),
        }
        self.state = TransactionState::RolledBack;
    }

    fn elapsed_ms(&self) -> u64 {
        self.started
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or_default()
    }
}

impl Drop for TransactionHandler {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if session.is_active() {
                self.roll_back(&mut session);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookupdao_core::DbConfig;
    use tempfile::TempDir;

    fn handler(dir: &TempDir, read_only: bool) -> TransactionHandler {
        let config = DbConfig {
            min_pool_size: 1,
            max_pool_size: 2,
            ..DbConfig::sqlite(dir.path().join("tx.db"))
        };
        let pool = ConnectionPool::new(&config).unwrap();
        TransactionHandler::new(pool, Arc::new(RowLockTable::new()), read_only)
    }

    #[test]
    fn test_commit_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mut handler = handler(&dir, false);
        assert_eq!(handler.state(), TransactionState::Idle);

        let session = handler.before_start().unwrap();
        session
            .connection()
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();
        assert_eq!(handler.state(), TransactionState::Active);

        handler.after_end().unwrap();
        assert_eq!(handler.state(), TransactionState::Committed);
        assert!(handler.session().is_none());

        let session = handler.before_start().unwrap();
        let count: i64 = session
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        handler.after_end().unwrap();
    }

    #[test]
    fn test_on_error_rolls_back() {
        let dir = TempDir::new().unwrap();
        let mut handler = handler(&dir, false);

        handler
            .before_start()
            .unwrap()
            .connection()
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER)")
            .unwrap();
        handler.on_error(&DaoError::validation("boom"));
        assert_eq!(handler.state(), TransactionState::RolledBack);
        assert!(handler.session().is_none());

        let session = handler.before_start().unwrap();
        assert!(session.connection().unwrap().prepare("SELECT x FROM t").is_err());
        handler.after_end().unwrap();
    }

    #[test]
    fn test_after_end_without_session_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut handler = handler(&dir, true);
        handler.after_end().unwrap();
        handler.on_error(&DaoError::validation("ignored"));
        assert_eq!(handler.state(), TransactionState::Idle);
    }

    #[test]
    fn test_drop_rolls_back_open_session() {
        let dir = TempDir::new().unwrap();
        let mut handler = handler(&dir, false);
        handler
            .before_start()
            .unwrap()
            .connection()
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER)")
            .unwrap();
        drop(handler);

        let mut handler = self::handler(&dir, false);
        let session = handler.before_start().unwrap();
        assert!(session.connection().unwrap().prepare("SELECT x FROM t").is_err());
    }
}
