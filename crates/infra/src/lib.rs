//! Infrastructure layer: Postgres adapters, file-backed model store,
//! deployment configuration and the periodic refresh runner.

pub mod config;
pub mod db;
pub mod model_store;
pub mod refresh;

pub use config::InfraConfig;
pub use db::{PgRuntime, PostgresForecastCache, PostgresSalesSource};
pub use model_store::FileModelStore;
pub use refresh::{
    ForecastRefreshRunner, InMemoryRefreshReportSink, LoggingReportSink, RefreshHandle, RefreshJob,
    RefreshReportSink,
};
