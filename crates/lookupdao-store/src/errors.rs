//! Error helpers for lookupdao-store
//!
//! Wraps lookupdao-core `DaoError` with adapter-specific constructors

use lookupdao_core::errors::DaoError;

/// Result type alias using DaoError
pub type Result<T> = std::result::Result<T, DaoError>;

/// Map a rusqlite error raised by `op`, keeping the constraint and busy classification
pub fn from_rusqlite(op: &'static str) -> impl Fn(rusqlite::Error) -> DaoError {
    move |err| DaoError::from_sqlite(op, err)
}

/// Pool could not hand out a connection in time
pub fn pool_exhausted(waited_ms: u64) -> DaoError {
    DaoError::operation(
        "pool.acquire",
        format!("no connection became available within {} ms", waited_ms),
    )
}

/// Store was closed
pub fn pool_closed() -> DaoError {
    DaoError::operation("pool.acquire", "connection pool is closed".to_string())
}

/// A joined session is missing or belongs elsewhere
pub fn invalid_join(reason: &str) -> DaoError {
    DaoError::operation("executor.join", reason.to_string())
}

/// Row lock held by another unit of work
pub fn lock_not_available(table: &str, id: i64) -> DaoError {
    DaoError::LockNotAvailable {
        resource: format!("{}#{}", table, id),
        source: None,
    }
}
