//! pgkit
//!
//! PostgreSQL helpers for services: environment-driven configuration, a
//! connection factory, context-aware execution with optional transactions,
//! composable query hooks and driver error classification.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod query;

pub use config::{PgConfig, db_config};
pub use db::{Database, ExecContext, InitGuard, global_db, init_db};
pub use error::{DbResult, DetailedError, PgError};
pub use query::{Query, QueryBuilder, QueryHook, QueryOp, Sort};
