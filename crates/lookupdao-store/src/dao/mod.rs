//! Typed repositories and locked workflows

pub mod batch_locked;
pub mod locked;
pub mod lookup_dao;
mod ops;

pub use batch_locked::BatchLockedContext;
pub use locked::LockedContext;
pub use lookup_dao::LookupDao;
