//! lookupdao store - SQLite engine adapter and typed repositories
//!
//! Provides:
//! - A sized connection pool and scoped sessions with explicit transactions
//! - An in-process row-lock table for shared and exclusive-no-wait access
//! - The transaction lifecycle manager and the generic transactional executor
//! - `LookupDao<T>`, the per-entity repository, with its locked workflows
//! - `DataStore`, which owns configuration, schema and entity registration

#![allow(clippy::result_large_err)]

pub mod dao;
pub mod db;
pub mod errors;
pub mod locks;
pub mod query;
pub mod schema;
pub mod session;
pub mod store;
pub mod transaction;

// Re-export key types
pub use dao::{BatchLockedContext, LockedContext, LookupDao};
pub use query::QueryParams;
pub use errors::Result;
pub use locks::{LockMode, RowKey, RowLockTable};
pub use session::Session;
pub use store::{DataStore, DataStoreBuilder};
pub use transaction::{Scope, TransactionExecutor, TransactionHandler, TransactionState};
