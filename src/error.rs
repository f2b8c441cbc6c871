//! Error types for pgkit.
//!
//! This module defines the crate error type using `thiserror` and the helpers
//! used to classify driver errors (missing rows, SQLSTATE codes, unique
//! constraint violations).

use serde::Serialize;
use sqlx::error::DatabaseError;
use sqlx::postgres::PgDatabaseError;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// SQLSTATE reported by PostgreSQL when a unique constraint is violated.
pub const UNIQUE_CONSTRAINT_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum PgError {
    #[error("Unknown postgres database name '{name}' - use one of {known:?}")]
    UnknownDatabase { name: String, known: Vec<String> },

    #[error("Invalid credentials in {env_key}: {source}")]
    ConfigParse {
        env_key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to open database connection: {message}")]
    ConnectionOpen { message: String, suggestion: String },

    #[error("Database ping failed: {message}")]
    ConnectionPing { message: String, suggestion: String },

    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    #[error(transparent)]
    Detailed(DetailedError),

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    /// Cached outcome of a failed first initialization, shared by every caller.
    #[error("Failed to initialize database: {0}")]
    Initialization(#[source] Arc<PgError>),
}

impl PgError {
    /// Create an unknown database error listing the registered names.
    pub fn unknown_database(name: impl Into<String>, known: Vec<String>) -> Self {
        Self::UnknownDatabase {
            name: name.into(),
            known,
        }
    }

    /// Create a credential parse error.
    pub fn config_parse(env_key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::ConfigParse {
            env_key: env_key.into(),
            source,
        }
    }

    /// Create a connection open error with a helpful suggestion.
    pub fn connection_open(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConnectionOpen {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a connection ping error with a helpful suggestion.
    pub fn connection_ping(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConnectionPing {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::ConnectionOpen { suggestion, .. } => Some(suggestion),
            Self::ConnectionPing { suggestion, .. } => Some(suggestion),
            Self::Initialization(inner) => inner.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionPing { .. } | Self::Timeout { .. } => true,
            Self::Driver(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }

    /// The driver-level database error carried by this error, if any.
    pub fn database_error(&self) -> Option<&dyn DatabaseError> {
        match self {
            Self::Driver(sqlx::Error::Database(db_err)) => Some(db_err.as_ref()),
            Self::Detailed(detailed) => Some(detailed.database_error()),
            Self::Initialization(inner) => inner.database_error(),
            _ => None,
        }
    }

    /// SQLSTATE code of the underlying database error, if any.
    pub fn code(&self) -> Option<Cow<'_, str>> {
        self.database_error().and_then(|e| e.code())
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::UnknownDatabase { .. } => "unknown_database",
            Self::ConfigParse { .. } => "config_parse",
            Self::ConnectionOpen { .. } => "connection_open",
            Self::ConnectionPing { .. } => "connection_ping",
            Self::Driver(sqlx::Error::RowNotFound) => "no_rows",
            Self::Driver(_) => "driver",
            Self::Detailed(_) => "detailed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Initialization(_) => "initialization",
        }
    }

    /// Build a serializable view of this error for diagnostics.
    pub fn report(&self) -> ErrorReport {
        let db_err = self.database_error();
        ErrorReport {
            kind: self.kind_name(),
            message: self.to_string(),
            code: self.code().map(Cow::into_owned),
            detail: db_err.and_then(pg_detail).map(str::to_string),
            constraint: db_err.and_then(|e| e.constraint()).map(str::to_string),
            table: db_err.and_then(|e| e.table()).map(str::to_string),
            suggestion: self.suggestion().map(str::to_string),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, PgError>;

/// Serializable error view written to the diagnostic log in debug mode.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

fn pg_detail(err: &dyn DatabaseError) -> Option<&str> {
    err.try_downcast_ref::<PgDatabaseError>()
        .and_then(|pg| pg.detail())
}

/// A driver-reported database error with human readable formatting.
///
/// Only obtainable through [`as_detailed_error`], so it always wraps an error
/// that came back from the server.
#[derive(Debug)]
pub struct DetailedError {
    inner: Box<dyn DatabaseError>,
}

impl DetailedError {
    pub fn code(&self) -> Option<Cow<'_, str>> {
        self.inner.code()
    }

    pub fn message(&self) -> &str {
        self.inner.message()
    }

    /// Optional `DETAIL` field sent by the server.
    pub fn detail(&self) -> Option<&str> {
        pg_detail(self.inner.as_ref())
    }

    pub fn constraint(&self) -> Option<&str> {
        self.inner.constraint()
    }

    pub fn table(&self) -> Option<&str> {
        self.inner.table()
    }

    pub fn database_error(&self) -> &dyn DatabaseError {
        self.inner.as_ref()
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code().as_deref() == Some(UNIQUE_CONSTRAINT_VIOLATION)
    }

    /// Unwrap back into the driver error.
    pub fn into_inner(self) -> sqlx::Error {
        sqlx::Error::Database(self.inner)
    }
}

impl fmt::Display for DetailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ERROR #{} {}",
            self.code().unwrap_or_default(),
            self.message()
        )?;
        match self.detail() {
            Some(detail) if !detail.is_empty() => write!(f, ", {}", detail),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for DetailedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_error())
    }
}

/// True iff `err` is the driver's "no rows returned" sentinel.
pub fn is_no_rows_error(err: &PgError) -> bool {
    match err {
        PgError::Driver(sqlx::Error::RowNotFound) => true,
        PgError::Initialization(inner) => is_no_rows_error(inner),
        _ => false,
    }
}

/// True iff `err` carries a database error whose SQLSTATE is one of `codes`.
pub fn equals_code(err: &PgError, codes: &[&str]) -> bool {
    match err.code() {
        Some(code) => codes.contains(&code.as_ref()),
        None => false,
    }
}

pub fn is_unique_violation(err: &PgError) -> bool {
    equals_code(err, &[UNIQUE_CONSTRAINT_VIOLATION])
}

/// Wrap a driver database error as [`PgError::Detailed`].
///
/// Any other error, including one that is already detailed, is returned as is.
pub fn as_detailed_error(err: PgError) -> PgError {
    match err {
        PgError::Driver(sqlx::Error::Database(inner)) => {
            PgError::Detailed(DetailedError { inner })
        }
        other => other,
    }
}
