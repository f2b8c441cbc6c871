//! Database access layer.
//!
//! - Connection factory ([`Database::connect`])
//! - Context-aware execution with optional transactions
//! - Run-once initialization guard
//! - Parameter binding for rendered queries

pub mod connection;
pub mod context;
pub mod init;
pub(crate) mod params;

pub use connection::Database;
pub use context::ExecContext;
pub use init::{InitGuard, global_db, init_db};
