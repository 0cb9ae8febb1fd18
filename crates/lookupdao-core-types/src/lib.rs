//! Core types shared across the lookupdao crates
//!
//! - **Correlation**: SessionId tags every log event of one unit of work
//! - **Sensitive data**: Sensitive<T> marker for automatic redaction
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;
pub mod sensitive;

pub use correlation::SessionId;
pub use sensitive::Sensitive;
