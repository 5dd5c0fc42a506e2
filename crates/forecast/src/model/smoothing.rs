//! Trend-adjusted exponential smoothing, the lightweight fallback strategy.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockcast_core::{EngineResult, ForecastError, ForecastPoint, StrategyKind, Subject};

use super::Forecaster;
use crate::features::FeatureRow;

/// Fitted smoothing state.
///
/// Point forecasts follow `s[h] = α·y_last + (1−α)·(s[h−1] + trend)` from
/// `s[0] = y_last`, with `trend = (y_last − y_first) / n`. Bands are
/// `z·σ·sqrt(h)` with `σ` the sample standard deviation of the history (or
/// `0.2 × mean` for a single observation), `h` counted in days from the end of
/// the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingModel {
    alpha: f64,
    last_value: f64,
    trend: f64,
    baseline: f64,
    sigma: f64,
    observations: usize,
    history_end: NaiveDate,
}

impl SmoothingModel {
    pub fn fit(subject: &Subject, rows: &[FeatureRow], alpha: f64) -> EngineResult<Self> {
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Err(ForecastError::model_fit(subject, "empty training history"));
        };
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ForecastError::invalid_config(format!(
                "smoothing alpha must lie in (0, 1] (got {alpha})"
            )));
        }

        let n = rows.len();
        let baseline = rows.iter().map(|r| r.quantity).sum::<f64>() / n as f64;
        let sigma = if n > 1 {
            let var = rows
                .iter()
                .map(|r| (r.quantity - baseline).powi(2))
                .sum::<f64>()
                / (n - 1) as f64;
            var.max(0.0).sqrt()
        } else {
            baseline * 0.2
        };

        Ok(Self {
            alpha,
            last_value: last.quantity,
            trend: (last.quantity - first.quantity) / n as f64,
            baseline,
            sigma,
            observations: n,
            history_end: last.date,
        })
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Point estimate `h` days past the end of the history.
    pub fn point_at(&self, h: u32) -> f64 {
        if self.observations <= 1 {
            return self.baseline;
        }
        let mut s = self.last_value;
        for _ in 0..h {
            s = self.alpha * self.last_value + (1.0 - self.alpha) * (s + self.trend);
        }
        s
    }

    /// Band half-width `h` days past the end of the history.
    pub fn margin(&self, h: u32, z: f64) -> f64 {
        z * self.sigma * (h as f64).sqrt()
    }
}

impl Forecaster for SmoothingModel {
    fn strategy(&self) -> StrategyKind {
        StrategyKind::ExponentialSmoothing
    }

    fn history_end(&self) -> NaiveDate {
        self.history_end
    }

    fn predict(&self, future: &[FeatureRow], z: f64) -> EngineResult<Vec<ForecastPoint>> {
        Ok(future
            .iter()
            .map(|row| {
                let h = (row.date - self.history_end).num_days().max(1) as u32;
                let value = self.point_at(h);
                let margin = self.margin(h, z);
                ForecastPoint::from_raw(row.date, value, value - margin, value + margin)
            })
            .collect())
    }
}
