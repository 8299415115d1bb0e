//! Structured logging facility
//!
//! - Single initialization point via `init(profile)`
//! - Structured logging macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions
//!
//! # Usage
//!
//! ```rust
//! use shardsaga_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```
//!
//! Coordinator boundaries log `start`/`end`/`end_error` through the macros.
//! Retries and state transitions are plain `tracing` events tagged with the
//! `retry` and `transition` event names from `shardsaga_core_types::schema`.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
