//! Run-once database initialization.
//!
//! [`InitGuard`] resolves the configuration and connects exactly once. The
//! first outcome is kept: later callers get the same [`Database`] or the same
//! failure, wrapped in [`PgError::Initialization`].

use super::connection::Database;
use crate::config::db_config;
use crate::error::{DbResult, PgError};
use std::future::Future;
use std::sync::{Arc, LazyLock};
use tokio::sync::OnceCell;
use tracing::{error, info};

#[derive(Debug, Default)]
pub struct InitGuard {
    cell: OnceCell<Result<Database, Arc<PgError>>>,
}

impl InitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the default database configuration and connect, once.
    pub async fn init(&self, app_name: &str, debug: bool) -> DbResult<Database> {
        let app_name = app_name.to_string();
        self.init_with(move || async move {
            let config = db_config(&app_name, debug)?;
            Database::connect(config).await
        })
        .await
    }

    /// Initialize with a custom connect function.
    ///
    /// Concurrent first callers wait for a single attempt; `connect` is not
    /// called again once an outcome is recorded.
    pub async fn init_with<F, Fut>(&self, connect: F) -> DbResult<Database>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DbResult<Database>>,
    {
        let outcome = self
            .cell
            .get_or_init(|| async move {
                match connect().await {
                    Ok(database) => {
                        info!(database = %database.config().database, "Database initialized");
                        Ok(database)
                    }
                    Err(e) => {
                        error!(error = %e, "Database initialization failed");
                        Err(Arc::new(e))
                    }
                }
            })
            .await;
        surface(outcome)
    }

    /// The recorded outcome, or `None` before the first attempt finishes.
    pub fn get(&self) -> Option<DbResult<Database>> {
        self.cell.get().map(surface)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Run `f` against the database if initialization succeeded.
    pub fn on_ready<R>(&self, f: impl FnOnce(&Database) -> R) -> Option<R> {
        match self.cell.get() {
            Some(Ok(database)) => Some(f(database)),
            _ => None,
        }
    }
}

fn surface(outcome: &Result<Database, Arc<PgError>>) -> DbResult<Database> {
    match outcome {
        Ok(database) => Ok(database.clone()),
        Err(e) => Err(PgError::Initialization(Arc::clone(e))),
    }
}

static GLOBAL: LazyLock<InitGuard> = LazyLock::new(InitGuard::new);

/// Initialize the process-wide database.
pub async fn init_db(app_name: &str, debug: bool) -> DbResult<Database> {
    GLOBAL.init(app_name, debug).await
}

/// The process-wide database, once [`init_db`] has finished.
pub fn global_db() -> Option<DbResult<Database>> {
    GLOBAL.get()
}
