//! Transaction lifecycle and the executor built on it

pub mod executor;
pub mod handler;

pub use executor::{Scope, TransactionExecutor};
pub use handler::{TransactionHandler, TransactionState};
