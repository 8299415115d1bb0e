//! shardsaga store - SQLite implementations of the shard connection and the
//! saga persistence hook
//!
//! Provides:
//! - `SqliteShardConnection`, a `ShardConnection` over one SQLite database
//! - `SqliteSagaLog`, a durable saga log implementing `SagaPersistence`
//! - SQLite schema for the saga log with a checksummed migration runner

pub mod connection;
pub mod db;
pub mod errors;
pub mod migrations;
pub mod saga_log;
mod values;

// Re-export key types
pub use connection::SqliteShardConnection;
pub use errors::Result;
pub use saga_log::SqliteSagaLog;
