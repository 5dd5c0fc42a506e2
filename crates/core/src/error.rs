//! Forecasting error model.

use thiserror::Error;

use crate::id::Subject;

/// Result type used across the forecasting engine.
pub type EngineResult<T> = Result<T, ForecastError>;

/// Engine-level error.
///
/// Every variant is scoped to a single request or subject: batch callers record
/// the error against the subject and carry on with the rest.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForecastError {
    /// The sales/calendar record source could not be reached.
    #[error("data access failed: {0}")]
    DataAccess(String),

    /// Too few distinct sale-days for per-subject modeling and no fallback.
    #[error("insufficient data for {subject}: {days} distinct sale-day(s) recorded")]
    InsufficientData { subject: Subject, days: u32 },

    /// Horizon outside `1..=max` days.
    #[error("invalid horizon: {requested} day(s) requested, must be between 1 and {max}")]
    InvalidHorizon { requested: u32, max: u32 },

    /// Inference requested for a subject that was never trained.
    #[error("no trained model for {subject}; train the subject first")]
    ModelArtifactMissing { subject: Subject },

    /// A stored artifact was produced by an incompatible fitting code version.
    #[error("model artifact format v{found} is not supported (expected v{expected}); retrain the subject")]
    ArtifactVersionMismatch { found: u32, expected: u32 },

    /// A stored artifact could not be decoded.
    #[error("model artifact is corrupt: {0}")]
    ArtifactCorrupt(String),

    /// Numerical failure while fitting a model.
    #[error("model fit failed for {subject}: {reason}")]
    ModelFit { subject: Subject, reason: String },

    /// A request argument failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Engine or infrastructure configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model store / forecast cache failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A subject's pipeline exceeded its time budget.
    #[error("forecast for {subject} timed out after {millis}ms")]
    Timeout { subject: Subject, millis: u64 },
}

impl ForecastError {
    pub fn data_access(msg: impl Into<String>) -> Self {
        Self::DataAccess(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn model_fit(subject: &Subject, reason: impl Into<String>) -> Self {
        Self::ModelFit {
            subject: subject.clone(),
            reason: reason.into(),
        }
    }

    /// Errors the caller may recover from by choosing a fallback or deferring.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientData { .. } | ForecastError::ModelArtifactMissing { .. }
        )
    }

    /// Failures of the environment rather than of the subject's data; the
    /// same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ForecastError::DataAccess(_) | ForecastError::Storage(_) | ForecastError::Timeout { .. }
        )
    }
}
