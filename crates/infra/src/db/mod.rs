//! Postgres adapters.
//!
//! The engine's seams are synchronous, so every adapter shares a [`PgRuntime`]:
//! a connection pool plus the tokio runtime its queries are driven on. Calls
//! must come from plain threads (the CLI, batch workers, the refresh runner),
//! never from inside another async runtime.
//!
//! ## Error mapping
//!
//! | sqlx error | sales source | forecast cache |
//! |---|---|---|
//! | `Database` | `DataAccess` | `Storage` |
//! | `PoolClosed` / `PoolTimedOut` / `Io` | `DataAccess` | `Storage` |
//! | decode / other | `DataAccess` | `Storage` |

pub mod forecast_cache;
pub mod sales_source;

use std::future::Future;
use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::Runtime;

use stockcast_core::{EngineResult, ForecastError};

pub use forecast_cache::PostgresForecastCache;
pub use sales_source::PostgresSalesSource;

/// Connection pool bound to the runtime that drives it.
#[derive(Clone)]
pub struct PgRuntime {
    pool: PgPool,
    runtime: Arc<Runtime>,
}

impl PgRuntime {
    pub fn connect(database_url: &str, max_connections: u32) -> EngineResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("stockcast-db")
            .enable_all()
            .build()
            .map_err(|e| ForecastError::data_access(format!("start database runtime: {e}")))?;

        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(database_url),
            )
            .map_err(|e| ForecastError::data_access(describe("connect", &e)))?;

        tracing::info!(max_connections, "connected to postgres");
        Ok(Self {
            pool,
            runtime: Arc::new(runtime),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Human-readable description of a sqlx failure.
pub(crate) fn describe(operation: &str, err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => format!("database error in {operation} ({code}): {}", db_err.message()),
            None => format!("database error in {operation}: {}", db_err.message()),
        },
        sqlx::Error::PoolClosed => format!("connection pool closed in {operation}"),
        sqlx::Error::PoolTimedOut => format!("timed out acquiring a connection in {operation}"),
        sqlx::Error::RowNotFound => format!("unexpected row not found in {operation}"),
        other => format!("sqlx error in {operation}: {other}"),
    }
}
