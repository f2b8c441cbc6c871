//! Execution-context helpers.
//!
//! Every `run*` method on [`Database`] funnels into one core `execute`, which
//! checks out a connection (or opens a transaction), hands it to the caller's
//! closure and races the work against the context's cancellation token and
//! deadline.
//!
//! Closures use the same shape as `sqlx::Connection::transaction`:
//!
//! ```ignore
//! let name: String = db
//!     .run(|conn| Box::pin(async move {
//!         Ok(sqlx::query_scalar("SELECT current_user").fetch_one(conn).await?)
//!     }))
//!     .await?;
//! ```

use super::connection::Database;
use crate::error::{DbResult, PgError};
use futures_util::future::BoxFuture;
use sqlx::PgConnection;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Cancellation and deadline carried into a database call.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Limit the context to `timeout` from now. An earlier deadline wins.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// A derived context that is cancelled together with `self` but can also
    /// be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Drive `future` unless the context is cancelled or its deadline passes
    /// first. The losing future is dropped.
    pub async fn guard<T, F>(&self, operation: &str, future: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        if self.is_cancelled() {
            return Err(PgError::cancelled(operation));
        }

        let started = Instant::now();
        let deadline = self.deadline;
        let deadline_reached = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(PgError::cancelled(operation)),
            _ = deadline_reached => Err(PgError::timeout(
                operation,
                started.elapsed().as_millis() as u64,
            )),
            result = future => result,
        }
    }
}

impl Database {
    /// Run `callback` on a pooled connection.
    pub async fn run<T, F>(&self, callback: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, DbResult<T>>,
    {
        let ctx = ExecContext::background();
        self.execute(&ctx, false, move |_, conn| callback(conn)).await
    }

    /// Run `callback` on a pooled connection, bounded by `ctx`.
    pub async fn run_context<T, F>(&self, ctx: &ExecContext, callback: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c ExecContext, &'c mut PgConnection) -> BoxFuture<'c, DbResult<T>>,
    {
        self.execute(ctx, false, callback).await
    }

    /// Run `callback` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub async fn run_in_transaction<T, F>(&self, callback: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, DbResult<T>>,
    {
        let ctx = ExecContext::background();
        self.execute(&ctx, true, move |_, conn| callback(conn)).await
    }

    /// Transactional form of [`Database::run_context`]. A cancelled or timed
    /// out transaction is dropped, which rolls it back.
    pub async fn run_in_transaction_context<T, F>(
        &self,
        ctx: &ExecContext,
        callback: F,
    ) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c ExecContext, &'c mut PgConnection) -> BoxFuture<'c, DbResult<T>>,
    {
        self.execute(ctx, true, callback).await
    }

    /// [`Database::run`] for callbacks that also report a count, usually the
    /// total for a paginated listing.
    pub async fn run_with_count<T, F>(&self, callback: F) -> DbResult<(T, i64)>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, DbResult<(T, i64)>>,
    {
        self.run(callback).await
    }

    pub async fn run_with_count_context<T, F>(
        &self,
        ctx: &ExecContext,
        callback: F,
    ) -> DbResult<(T, i64)>
    where
        F: for<'c> FnOnce(
            &'c ExecContext,
            &'c mut PgConnection,
        ) -> BoxFuture<'c, DbResult<(T, i64)>>,
    {
        self.run_context(ctx, callback).await
    }

    pub async fn run_with_count_in_transaction<T, F>(&self, callback: F) -> DbResult<(T, i64)>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, DbResult<(T, i64)>>,
    {
        self.run_in_transaction(callback).await
    }

    pub async fn run_with_count_in_transaction_context<T, F>(
        &self,
        ctx: &ExecContext,
        callback: F,
    ) -> DbResult<(T, i64)>
    where
        F: for<'c> FnOnce(
            &'c ExecContext,
            &'c mut PgConnection,
        ) -> BoxFuture<'c, DbResult<(T, i64)>>,
    {
        self.run_in_transaction_context(ctx, callback).await
    }

    async fn execute<T, F>(&self, ctx: &ExecContext, transactional: bool, callback: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c ExecContext, &'c mut PgConnection) -> BoxFuture<'c, DbResult<T>>,
    {
        let operation = if transactional { "transaction" } else { "run" };
        let result = ctx
            .guard(operation, self.execute_unguarded(ctx, transactional, callback))
            .await;

        if let Err(e) = &result {
            if self.is_debug() {
                log_diagnostics(operation, e);
            }
        }
        result
    }

    async fn execute_unguarded<T, F>(
        &self,
        ctx: &ExecContext,
        transactional: bool,
        callback: F,
    ) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c ExecContext, &'c mut PgConnection) -> BoxFuture<'c, DbResult<T>>,
    {
        if !transactional {
            let mut conn = self.pool().acquire().await?;
            return callback(ctx, &mut *conn).await;
        }

        let mut tx = self.pool().begin().await?;
        match callback(ctx, &mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(error = %rollback_error, "Failed to roll back transaction");
                } else {
                    debug!(error = %e, "Transaction rolled back");
                }
                Err(e)
            }
        }
    }
}

fn log_diagnostics(operation: &str, err: &PgError) {
    let report = serde_json::to_string_pretty(&err.report()).unwrap_or_default();
    error!(operation = %operation, error = %err, report = %report, "Database call failed");
}
