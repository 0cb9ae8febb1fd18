//! lookupdao core - shared vocabulary of the data-access layer
//!
//! This crate provides the pieces every repository is built from:
//! - `Entity` declarations and the `EntityDescriptor` discovered from them
//! - `Criteria`, the declarative query specification rendered to SQL
//! - `DbConfig`, the configuration consumed when a store is opened
//! - The `DaoError` taxonomy and the structured logging facility

pub mod config;
pub mod criteria;
pub mod entity;
pub mod errors;
pub mod logging_facility;

// Re-export commonly used types
pub use config::DbConfig;
pub use criteria::{Criteria, Order, Restriction};
pub use entity::{Attribute, Entity, EntityDescriptor, Marker, SqlType};
pub use errors::{DaoError, DaoErrorKind, Result};
pub use rusqlite::types::Value;
