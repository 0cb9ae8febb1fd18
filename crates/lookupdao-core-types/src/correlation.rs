//! Correlation identifiers
//!
//! A `SessionId` is minted for every scoped session so that log events and
//! row-lock ownership of one unit of work can be tied together.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one scoped session (one unit of work)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new SessionId using UUIDv7, so ids sort by creation time
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Borrow the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
