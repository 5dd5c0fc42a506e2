//! `stockcast-forecast`
//!
//! **Responsibility:** Demand forecasting engine.
//!
//! - Assembles zero-filled daily series from a [`SalesSource`].
//! - Derives calendar, promotion, season and autoregressive features.
//! - Fits a decomposition model (trend + seasonality + holidays + regressors)
//!   or, for sparse histories, an exponential-smoothing fallback.
//! - Persists fitted models as versioned artifacts and caches forecasts.
//!
//! Storage and runtime concerns stay behind traits; adapters live in
//! `stockcast-infra`.

pub mod artifact;
pub mod assembler;
pub mod batch;
pub mod cache;
pub mod clock;
pub mod config;
pub mod evaluate;
pub mod features;
pub mod guard;
pub mod model;
pub mod orchestrator;
pub mod outcome;
pub mod source;
pub mod store;

pub use artifact::{ARTIFACT_FORMAT_VERSION, ModelArtifact};
pub use assembler::TimeSeriesAssembler;
pub use batch::{BatchExecutor, Cancellation, SequentialExecutor, SubjectResults, ThreadPoolExecutor};
pub use cache::{ForecastCache, InMemoryForecastCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ForecastConfig;
pub use evaluate::{AccuracyMetrics, CrossValidationConfig, ModelEvaluator};
pub use features::{
    FeatureConfig, FeatureEngineer, FeatureRow, Regressor, RegressorContract, RegressorStatus, RegressorUsage,
    SeasonProfile,
};
pub use guard::{DataSufficiency, SparseDataGuard};
pub use model::{
    DecompositionConfig, DecompositionModel, FitOutcome, FittedModel, ForecastModel, Forecaster, SeasonalityMode,
    SmoothingModel,
};
pub use orchestrator::{ForecastOrchestrator, ForecastRequest, PipelineStage};
pub use outcome::{
    BatchSummary, CrossValidationReport, CutoffMetrics, ForecastOutcome, ForecastSummary, SparseSkip, SubjectFailure,
    SubjectForecast, TrainReport, TrainStatus, TrainingSummary,
};
pub use source::{InMemorySalesSource, SaleRecord, SalesSource};
pub use store::{InMemoryModelStore, ModelStore};
