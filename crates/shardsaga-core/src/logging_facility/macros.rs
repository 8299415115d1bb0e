//! Operation boundary macros
//!
//! A coordinator operation (`saga_execute`, `saga_commit`, `saga_rollback`,
//! `saga_compensate`) emits one `start` event when it is entered and exactly
//! one of `end` or `end_error` when it returns. All three carry the emitting
//! module as `component` and the operation name as `op`; anything after the
//! fixed arguments is passed to `tracing` as extra fields.
//!
//! ```
//! use shardsaga_core::errors::{ExError, ExErrorKind};
//! use shardsaga_core::{log_op_end, log_op_error, log_op_start};
//! use std::time::Instant;
//!
//! fn commit(saga_id: &str, active: bool) -> Result<(), ExError> {
//!     log_op_start!("saga_commit", saga_id = saga_id);
//!     let start = Instant::now();
//!     if !active {
//!         let err = ExError::new(ExErrorKind::InvalidState).with_op("saga_commit");
//!         log_op_error!(
//!             "saga_commit",
//!             err.clone(),
//!             duration_ms = start.elapsed().as_millis() as u64,
//!             saga_id = saga_id
//!         );
//!         return Err(err);
//!     }
//!     log_op_end!(
//!         "saga_commit",
//!         duration_ms = start.elapsed().as_millis() as u64,
//!         saga_id = saga_id
//!     );
//!     Ok(())
//! }
//!
//! assert!(commit("s1", true).is_ok());
//! assert!(commit("s2", false).is_err());
//! ```

/// Paths the exported macros expand to, so callers need neither `tracing`
/// nor `shardsaga-core-types` in their own manifest
#[doc(hidden)]
pub mod __support {
    pub use shardsaga_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};
    pub use tracing;
}

/// `start` event of an operation, at INFO
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        $crate::logging_facility::macros::__support::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::macros::__support::EVENT_START,
            $($($field)*)?
        )
    };
}

/// `end` event of an operation, at INFO; `duration_ms` is required
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        $crate::logging_facility::macros::__support::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::macros::__support::EVENT_END,
            duration_ms = $duration,
            $($($field)*)?
        )
    };
}

/// `end_error` event of an operation, at ERROR
///
/// `$err` is anything convertible into [`ExError`](crate::errors::ExError);
/// its kind, stable code and rendered message become `err_kind`, `err_code`
/// and `error`.
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let failure: $crate::errors::ExError = ::core::convert::Into::into($err);
        $crate::logging_facility::macros::__support::tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::macros::__support::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?failure.kind(),
            err_code = failure.code(),
            error = %failure,
            $($($field)*)?
        )
    }};
}
