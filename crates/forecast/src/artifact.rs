//! Versioned, serialized model artifacts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockcast_core::{ArtifactId, EngineResult, ForecastError, StrategyKind, Subject};

use crate::features::Regressor;
use crate::model::{Forecaster, FittedModel};

/// Bumped whenever fitted-parameter layout or feature semantics change.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// A fitted model bound to one subject, plus what it was fitted against.
///
/// Never mutated after creation; retraining produces a new artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub id: ArtifactId,
    pub subject: Subject,
    pub fitted_at: DateTime<Utc>,
    pub history_start: NaiveDate,
    pub history_end: NaiveDate,
    /// Average daily demand over the training history.
    pub history_mean: f64,
    pub sale_days: u32,
    pub regressors: Vec<Regressor>,
    pub model: FittedModel,
}

impl ModelArtifact {
    pub fn new(
        subject: Subject,
        model: FittedModel,
        history_start: NaiveDate,
        history_mean: f64,
        sale_days: u32,
        fitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            id: ArtifactId::new(),
            subject,
            fitted_at,
            history_start,
            history_end: model.history_end(),
            history_mean,
            sale_days,
            regressors: model.regressors(),
            model,
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        self.model.strategy()
    }

    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ForecastError::storage(format!("encode artifact: {e}")))
    }

    /// Decode, rejecting artifacts written by a different format version
    /// before touching their model payload.
    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let raw: JsonValue =
            serde_json::from_slice(bytes).map_err(|e| ForecastError::ArtifactCorrupt(e.to_string()))?;
        let found = raw
            .get("format_version")
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| ForecastError::ArtifactCorrupt("missing format_version".into()))?;
        if found != u64::from(ARTIFACT_FORMAT_VERSION) {
            return Err(ForecastError::ArtifactVersionMismatch {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        serde_json::from_value(raw).map_err(|e| ForecastError::ArtifactCorrupt(e.to_string()))
    }
}
