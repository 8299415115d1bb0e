//! shardsaga engine - saga execution coordinator
//!
//! Runs the route units of each logical statement on their shard
//! connections, records a revert unit for every local commit and, when a
//! unit fails for good under backward recovery, replays the recorded reverts
//! in reverse completion order.

pub mod compensation;
pub mod coordinator;
pub mod forward;
pub mod log;
pub mod retry;
pub mod saga;

pub use coordinator::{RollbackOutcome, SagaCoordinator, SharedConnection, StatementOutcome};
pub use log::ExecutionLog;
pub use retry::RetryPolicy;
pub use saga::SagaTransaction;
