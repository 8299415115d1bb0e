//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names identical across the coordinator, the
//! revert engine and the persistence layer.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Saga identifiers
pub const FIELD_SAGA_ID: &str = "saga_id";
pub const FIELD_STATEMENT_INDEX: &str = "statement_index";
pub const FIELD_SEQUENCE: &str = "sequence";

// Route unit identifiers
pub const FIELD_DATA_SOURCE: &str = "data_source";
pub const FIELD_ACTUAL_TABLE: &str = "actual_table";
pub const FIELD_ATTEMPT: &str = "attempt";

// State machine
pub const FIELD_FROM_STATE: &str = "from_state";
pub const FIELD_TO_STATE: &str = "to_state";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_RETRY: &str = "retry";
pub const EVENT_TRANSITION: &str = "transition";
