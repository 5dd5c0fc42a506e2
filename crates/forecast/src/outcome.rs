//! Result variants and run summaries returned by the orchestrator.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockcast_core::{Category, EngineResult, ForecastError, ForecastResult, RunId, StrategyKind, Subject};

use crate::evaluate::AccuracyMetrics;

/// Outcome of a single forecast request, branched on as data.
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastOutcome {
    Ready(ForecastResult),
    /// Too little history and no usable category fallback.
    Insufficient { subject: Subject, days: u32 },
    /// The subject (or its fallback category) was never trained.
    NotFound { subject: Subject },
    /// The request was rejected before any computation.
    Invalid { reason: String },
    Failed(ForecastError),
}

impl ForecastOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ForecastOutcome::Ready(_))
    }

    pub fn result(&self) -> Option<&ForecastResult> {
        match self {
            ForecastOutcome::Ready(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_result(self) -> EngineResult<ForecastResult> {
        match self {
            ForecastOutcome::Ready(result) => Ok(result),
            ForecastOutcome::Insufficient { subject, days } => {
                Err(ForecastError::InsufficientData { subject, days })
            }
            ForecastOutcome::NotFound { subject } => Err(ForecastError::ModelArtifactMissing { subject }),
            ForecastOutcome::Invalid { reason } => Err(ForecastError::Validation(reason)),
            ForecastOutcome::Failed(err) => Err(err),
        }
    }
}

impl From<EngineResult<ForecastResult>> for ForecastOutcome {
    fn from(value: EngineResult<ForecastResult>) -> Self {
        match value {
            Ok(result) => ForecastOutcome::Ready(result),
            Err(ForecastError::InsufficientData { subject, days }) => {
                ForecastOutcome::Insufficient { subject, days }
            }
            Err(ForecastError::ModelArtifactMissing { subject }) => ForecastOutcome::NotFound { subject },
            Err(err @ (ForecastError::InvalidHorizon { .. } | ForecastError::Validation(_))) => {
                ForecastOutcome::Invalid {
                    reason: err.to_string(),
                }
            }
            Err(err) => ForecastOutcome::Failed(err),
        }
    }
}

/// One entry of a bulk forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectForecast {
    pub subject: Subject,
    pub outcome: ForecastOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectFailure {
    pub subject: Subject,
    pub error: String,
    /// The failure came from the environment, not the subject's data.
    #[serde(default)]
    pub retryable: bool,
}

impl SubjectFailure {
    pub fn new(subject: Subject, error: &ForecastError) -> Self {
        Self {
            subject,
            error: error.to_string(),
            retryable: error.is_transient(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SparseSkip {
    pub subject: Subject,
    pub days: u32,
}

/// Offline batch forecast summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSummary {
    pub run_id: RunId,
    pub horizon_days: u32,
    pub started_at: DateTime<Utc>,
    pub forecasts: Vec<ForecastResult>,
    pub sparse_skips: Vec<SparseSkip>,
    pub failures: Vec<SubjectFailure>,
    /// Forecast rows upserted into the cache.
    pub cached_rows: usize,
}

impl BatchSummary {
    pub fn successes(&self) -> usize {
        self.forecasts.len()
    }

    pub fn total(&self) -> usize {
        self.forecasts.len() + self.sparse_skips.len() + self.failures.len()
    }

    /// Subjects whose failure may clear on a later attempt.
    pub fn retryable_subjects(&self) -> Vec<Subject> {
        self.failures
            .iter()
            .filter(|f| f.retryable)
            .map(|f| f.subject.clone())
            .collect()
    }
}

/// Interactive demand summary over a capped set of active SKUs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastSummary {
    pub category: Option<Category>,
    pub horizon_days: u32,
    pub products_analysed: usize,
    pub total_forecasted_demand: f64,
    pub average_daily_demand: f64,
    pub forecasts: Vec<ForecastResult>,
    pub skipped: Vec<SubjectFailure>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainStatus {
    Success,
    InsufficientData,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainReport {
    pub subject: Subject,
    pub status: TrainStatus,
    /// Distinct sale-days the decision was based on.
    pub sale_days: u32,
    pub strategy: Option<StrategyKind>,
    /// Hold-out accuracy, when evaluation ran.
    pub metrics: Option<AccuracyMetrics>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl TrainReport {
    pub(crate) fn insufficient(subject: Subject, days: u32) -> Self {
        Self {
            subject,
            status: TrainStatus::InsufficientData,
            sale_days: days,
            strategy: None,
            metrics: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn failed(subject: Subject, error: &ForecastError) -> Self {
        Self {
            subject,
            status: TrainStatus::Error,
            sale_days: 0,
            strategy: None,
            metrics: None,
            warnings: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub reports: Vec<TrainReport>,
    /// Mean hold-out metrics over successful, evaluated subjects.
    pub average_metrics: Option<AccuracyMetrics>,
}

impl TrainingSummary {
    pub(crate) fn new(run_id: RunId, started_at: DateTime<Utc>, reports: Vec<TrainReport>) -> Self {
        let evaluated: Vec<&AccuracyMetrics> = reports
            .iter()
            .filter(|r| r.status == TrainStatus::Success)
            .filter_map(|r| r.metrics.as_ref())
            .collect();
        let average_metrics = (!evaluated.is_empty()).then(|| AccuracyMetrics::average(evaluated));
        Self {
            run_id,
            started_at,
            reports,
            average_metrics,
        }
    }

    pub fn count(&self, status: TrainStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }
}

/// Accuracy of one rolling-origin fold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CutoffMetrics {
    /// First scored day; the model saw only earlier days.
    pub cutoff: NaiveDate,
    /// Sale-days in the fitted part of the history.
    pub train_days: u32,
    pub metrics: AccuracyMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrossValidationReport {
    pub subject: Subject,
    pub horizon_days: u32,
    pub folds: Vec<CutoffMetrics>,
    /// Mean over folds; `None` when no fold could be scored.
    pub average_metrics: Option<AccuracyMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_onto_outcome_variants() {
        let subject = Subject::sku("SAR-001").unwrap();

        let insufficient: ForecastOutcome = Err(ForecastError::InsufficientData {
            subject: subject.clone(),
            days: 3,
        })
        .into();
        assert_eq!(insufficient, ForecastOutcome::Insufficient { subject: subject.clone(), days: 3 });

        let invalid: ForecastOutcome = Err(ForecastError::InvalidHorizon { requested: 400, max: 365 }).into();
        assert!(matches!(invalid, ForecastOutcome::Invalid { .. }));

        let failed: ForecastOutcome = Err(ForecastError::data_access("down")).into();
        assert_eq!(failed.into_result().unwrap_err(), ForecastError::data_access("down"));
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        let down = Subject::sku("SAR-001").unwrap();
        let broken = Subject::sku("SAR-002").unwrap();
        let summary = BatchSummary {
            run_id: RunId::new(),
            horizon_days: 7,
            started_at: Utc::now(),
            forecasts: vec![],
            sparse_skips: vec![],
            failures: vec![
                SubjectFailure::new(down.clone(), &ForecastError::data_access("connection reset")),
                SubjectFailure::new(broken.clone(), &ForecastError::model_fit(&broken, "singular matrix")),
            ],
            cached_rows: 0,
        };
        assert_eq!(summary.retryable_subjects(), vec![down]);

        let legacy: SubjectFailure =
            serde_json::from_str(r#"{"subject":{"kind":"sku","code":"SAR-002"},"error":"boom"}"#).unwrap();
        assert!(!legacy.retryable);
    }

    #[test]
    fn training_summary_averages_successful_evaluations_only() {
        let subject = Subject::sku("A").unwrap();
        let success = |mae: f64| TrainReport {
            subject: subject.clone(),
            status: TrainStatus::Success,
            sale_days: 90,
            strategy: Some(StrategyKind::Decomposition),
            metrics: Some(AccuracyMetrics { mae, rmse: mae, mape: 10.0 }),
            warnings: vec![],
            error: None,
        };
        let summary = TrainingSummary::new(
            RunId::new(),
            Utc::now(),
            vec![
                success(2.0),
                success(4.0),
                TrainReport::insufficient(subject.clone(), 5),
                TrainReport::failed(subject.clone(), &ForecastError::data_access("down")),
            ],
        );

        assert_eq!(summary.count(TrainStatus::Success), 2);
        assert_eq!(summary.count(TrainStatus::InsufficientData), 1);
        assert_eq!(summary.average_metrics.unwrap().mae, 3.0);
    }
}
