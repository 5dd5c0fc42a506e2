//! Forecast model strategies.
//!
//! Two interchangeable strategies sit behind [`Forecaster`]:
//! - [`DecompositionModel`]: the full statistical model, used with enough
//!   history and a non-empty regressor contract;
//! - [`SmoothingModel`]: trend-adjusted exponential smoothing for short or
//!   regressor-less histories.
//!
//! Both share the same two-sided normal quantile for a confidence level; the
//! band derivations stay strategy-specific and every result names its
//! strategy.

pub mod decomposition;
pub mod smoothing;

mod linalg;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use stockcast_core::{ConfidenceLevel, EngineResult, ForecastError, ForecastPoint, StrategyKind, Subject};

use crate::features::{FeatureRow, Regressor, RegressorContract, RegressorStatus};

pub use decomposition::{DecompositionConfig, DecompositionModel, SeasonalityMode};
pub use smoothing::SmoothingModel;

/// A fitted model able to project future feature rows.
pub trait Forecaster {
    fn strategy(&self) -> StrategyKind;

    /// Last date of the training history.
    fn history_end(&self) -> NaiveDate;

    /// One point per future row, bands at quantile `z`.
    fn predict(&self, future: &[FeatureRow], z: f64) -> EngineResult<Vec<ForecastPoint>>;
}

/// Two-sided standard-normal quantile: 1.96 for 0.95.
pub fn normal_quantile(level: ConfidenceLevel) -> EngineResult<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ForecastError::validation(format!("standard normal unavailable: {e}")))?;
    Ok(normal.inverse_cdf(1.0 - (1.0 - level.value()) / 2.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FittedModel {
    Decomposition(DecompositionModel),
    ExponentialSmoothing(SmoothingModel),
}

impl FittedModel {
    /// Regressors the model was fitted against (none for smoothing).
    pub fn regressors(&self) -> Vec<Regressor> {
        match self {
            FittedModel::Decomposition(m) => m.regressors(),
            FittedModel::ExponentialSmoothing(_) => Vec::new(),
        }
    }

    pub fn forecast(&self, future: &[FeatureRow], level: ConfidenceLevel) -> EngineResult<Vec<ForecastPoint>> {
        self.predict(future, normal_quantile(level)?)
    }
}

impl Forecaster for FittedModel {
    fn strategy(&self) -> StrategyKind {
        match self {
            FittedModel::Decomposition(m) => m.strategy(),
            FittedModel::ExponentialSmoothing(m) => m.strategy(),
        }
    }

    fn history_end(&self) -> NaiveDate {
        match self {
            FittedModel::Decomposition(m) => m.history_end(),
            FittedModel::ExponentialSmoothing(m) => m.history_end(),
        }
    }

    fn predict(&self, future: &[FeatureRow], z: f64) -> EngineResult<Vec<ForecastPoint>> {
        match self {
            FittedModel::Decomposition(m) => m.predict(future, z),
            FittedModel::ExponentialSmoothing(m) => m.predict(future, z),
        }
    }
}

/// Outcome of fitting: the model plus any training-time warnings.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub model: FittedModel,
    pub warnings: Vec<String>,
}

/// Chooses a strategy for a history and fits it.
#[derive(Debug, Clone)]
pub struct ForecastModel {
    min_sale_days: u32,
    smoothing_alpha: f64,
    decomposition: DecompositionConfig,
}

impl ForecastModel {
    pub fn new(min_sale_days: u32, smoothing_alpha: f64, decomposition: DecompositionConfig) -> Self {
        Self {
            min_sale_days,
            smoothing_alpha,
            decomposition,
        }
    }

    pub fn select_strategy(&self, sale_days: u32, contract: &RegressorContract) -> StrategyKind {
        if sale_days >= self.min_sale_days && !contract.is_empty() {
            StrategyKind::Decomposition
        } else {
            StrategyKind::ExponentialSmoothing
        }
    }

    pub fn fit(
        &self,
        subject: &Subject,
        rows: &[FeatureRow],
        contract: &RegressorContract,
        sale_days: u32,
    ) -> EngineResult<FitOutcome> {
        match self.select_strategy(sale_days, contract) {
            StrategyKind::Decomposition => {
                let usage = contract.resolve_history(rows);
                let warnings = usage.iter().filter_map(|u| u.warning("training")).collect();
                let present: Vec<Regressor> = usage
                    .iter()
                    .filter(|u| u.status == RegressorStatus::Present)
                    .map(|u| u.regressor)
                    .collect();
                let model = DecompositionModel::fit(subject, rows, &present, &self.decomposition)?;
                Ok(FitOutcome {
                    model: FittedModel::Decomposition(model),
                    warnings,
                })
            }
            StrategyKind::ExponentialSmoothing => Ok(FitOutcome {
                model: FittedModel::ExponentialSmoothing(SmoothingModel::fit(
                    subject,
                    rows,
                    self.smoothing_alpha,
                )?),
                warnings: Vec::new(),
            }),
        }
    }
}
