//! Canonical schema constants for structured logging
//!
//! These constants keep field names and event names consistent across the
//! executor, the transaction lifecycle and the connection pool.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_SESSION_ID: &str = "session_id";

// Storage identifiers
pub const FIELD_TABLE: &str = "table";
pub const FIELD_ENTITY_ID: &str = "entity_id";
pub const FIELD_LOOKUP_KEY: &str = "lookup_key";

// Collection sizes
pub const FIELD_ROWS: &str = "rows";
pub const FIELD_PAGE_SIZE: &str = "page_size";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

// Transaction lifecycle operations
pub const OP_TX_BEGIN: &str = "tx.begin";
pub const OP_TX_COMMIT: &str = "tx.commit";
pub const OP_TX_ROLLBACK: &str = "tx.rollback";
pub const OP_TX_ROLLBACK_SKIPPED: &str = "tx.rollback_skipped";
