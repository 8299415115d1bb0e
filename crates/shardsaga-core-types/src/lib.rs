//! Core types shared across the shardsaga crates
//!
//! This crate provides foundational types used by the error, logging and
//! persistence facilities:
//!
//! - **Correlation types**: SagaId
//! - **Sensitive data**: Sensitive<T> marker for redacting bound SQL parameters
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;
pub mod sensitive;

pub use correlation::SagaId;
pub use sensitive::Sensitive;
