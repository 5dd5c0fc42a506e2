//! `stockcast-core`: forecasting domain primitives.
//!
//! Pure data types shared by the engine and its adapters (no IO).

pub mod calendar;
pub mod error;
pub mod forecast;
pub mod id;
pub mod series;

pub use calendar::{CalendarEvent, CalendarEvents, EventKind, PromotionWindow};
pub use error::{EngineResult, ForecastError};
pub use forecast::{
    CachedForecast, ConfidenceLevel, ForecastPoint, ForecastResult, MAX_HORIZON_DAYS, StrategyKind,
    round2, validate_horizon,
};
pub use id::{ArtifactId, Category, RunId, Sku, Subject};
pub use series::{Observation, ObservationSeries};
