use rusqlite::ffi;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type alias using DaoError
pub type Result<T> = std::result::Result<T, DaoError>;

/// Canonical error kind taxonomy
///
/// Every `DaoError` maps to exactly one kind, and every kind to a stable
/// code that callers can match on without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaoErrorKind {
    /// Entity shape or store configuration is invalid; fatal at construction
    Configuration,
    /// A locked workflow target does not exist
    NotFound,
    /// An exclusive row lock is held elsewhere, or the engine reported busy
    LockNotAvailable,
    /// The engine rejected a write on a uniqueness constraint
    ConstraintViolation,
    /// A workflow predicate failed or an argument was rejected
    Validation,
    /// A single-result query matched more than one row
    NonUniqueResult,
    /// Any other engine failure
    Operation,
}

impl DaoErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            DaoErrorKind::Configuration => "ERR_CONFIGURATION",
            DaoErrorKind::NotFound => "ERR_NOT_FOUND",
            DaoErrorKind::LockNotAvailable => "ERR_LOCK_NOT_AVAILABLE",
            DaoErrorKind::ConstraintViolation => "ERR_CONSTRAINT_VIOLATION",
            DaoErrorKind::Validation => "ERR_VALIDATION",
            DaoErrorKind::NonUniqueResult => "ERR_NON_UNIQUE_RESULT",
            DaoErrorKind::Operation => "ERR_OPERATION",
        }
    }
}

/// Errors raised by repositories, workflows and the storage adapter
#[derive(Error, Debug)]
pub enum DaoError {
    /// Entity descriptor discovery failed
    #[error("Invalid entity {entity}, DAO cannot be created: {reason}")]
    Configuration { entity: String, reason: String },

    /// Store configuration was rejected
    #[error("Invalid store configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Locked workflow target is missing
    #[error("Entity {entity} doesn't exist for keys: {keys}")]
    NotFound { entity: String, keys: String },

    /// Exclusive lock could not be obtained without waiting
    ///
    /// `source` is the engine error when SQLite reported the contention,
    /// `None` when a row lock is held by another session.
    #[error("Lock not available on {resource}")]
    LockNotAvailable {
        resource: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// Uniqueness constraint rejected a write
    #[error("Constraint violation: {message}")]
    ConstraintViolation {
        message: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Predicate or argument check failed
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// More rows than the single-result accessor allows
    #[error("Query on {entity} returned more than one row where at most one was expected")]
    NonUniqueResult { entity: String },

    /// Generic wrapper for an underlying failure
    #[error("Operation '{op}' failed: {source}")]
    Operation {
        op: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DaoError {
    /// Get the error kind
    pub fn kind(&self) -> DaoErrorKind {
        match self {
            DaoError::Configuration { .. } | DaoError::InvalidConfig { .. } => {
                DaoErrorKind::Configuration
            }
            DaoError::NotFound { .. } => DaoErrorKind::NotFound,
            DaoError::LockNotAvailable { .. } => DaoErrorKind::LockNotAvailable,
            DaoError::ConstraintViolation { .. } => DaoErrorKind::ConstraintViolation,
            DaoError::Validation { .. } => DaoErrorKind::Validation,
            DaoError::NonUniqueResult { .. } => DaoErrorKind::NonUniqueResult,
            DaoError::Operation { .. } => DaoErrorKind::Operation,
        }
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// True for uniqueness violations, which the lifecycle must not roll back
    pub fn is_constraint_violation(&self) -> bool {
        self.kind() == DaoErrorKind::ConstraintViolation
    }

    /// Create a configuration error for an entity type
    pub fn configuration(entity: &str, reason: impl Into<String>) -> Self {
        DaoError::Configuration {
            entity: entity.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        DaoError::Validation {
            message: message.into(),
        }
    }

    /// Wrap any error as an operation failure
    pub fn operation(
        op: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        DaoError::Operation {
            op: op.into(),
            source: source.into(),
        }
    }

    /// Classify a rusqlite error raised while running `op`
    ///
    /// Uniqueness failures become `ConstraintViolation`, busy/locked
    /// databases become `LockNotAvailable`, everything else is an
    /// `Operation` error carrying the original cause.
    pub fn from_sqlite(op: &str, err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation
                    && (failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                        || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
            {
                DaoError::ConstraintViolation {
                    message: message.clone().unwrap_or_else(|| failure.to_string()),
                    source: err,
                }
            }
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::DatabaseBusy
                    || failure.code == ErrorCode::DatabaseLocked =>
            {
                DaoError::LockNotAvailable {
                    resource: format!("database ({})", op),
                    source: Some(err),
                }
            }
            _ => DaoError::operation(op, err),
        }
    }
}
