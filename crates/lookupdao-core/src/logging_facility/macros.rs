//! Canonical logging macros
//!
//! Every repository call and lifecycle transition is logged through these so
//! that events carry the same `component` / `op` / `event` fields.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use lookupdao_core::log_op_start;
/// log_op_start!("lookup_dao.get");
/// log_op_start!("lookup_dao.get", table = "test_entity");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = lookupdao_core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = lookupdao_core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use lookupdao_core::log_op_end;
/// log_op_end!("lookup_dao.get", duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = lookupdao_core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = lookupdao_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// `$err` is borrowed; the caller keeps ownership to propagate it.
///
/// # Example
///
/// ```
/// # use lookupdao_core::{log_op_error, errors::DaoError};
/// let err = DaoError::validation("Predicate check failed");
/// log_op_error!("locked.execute", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let dao_err: &$crate::errors::DaoError = &$err;
        tracing::warn!(
            component = module_path!(),
            op = $op,
            event = lookupdao_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?dao_err.kind(),
            err_code = dao_err.code(),
            error = %dao_err,
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let dao_err: &$crate::errors::DaoError = &$err;
        tracing::warn!(
            component = module_path!(),
            op = $op,
            event = lookupdao_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?dao_err.kind(),
            err_code = dao_err.code(),
            error = %dao_err,
            $($field)*
        );
    }};
}
