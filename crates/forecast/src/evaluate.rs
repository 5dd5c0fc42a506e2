//! Hold-out accuracy metrics and rolling-origin evaluation windows.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use stockcast_core::{EngineResult, ForecastError, ForecastPoint, ObservationSeries, round2};

/// MAE, RMSE and MAPE (percent), rounded to two decimals.
///
/// `NaN` is the "undefined" sentinel: MAPE when every actual is 0, all three
/// when no valid pairs remain. It serializes as JSON `null`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    #[serde(with = "nan_as_null")]
    pub mae: f64,
    #[serde(with = "nan_as_null")]
    pub rmse: f64,
    #[serde(with = "nan_as_null")]
    pub mape: f64,
}

impl AccuracyMetrics {
    pub const UNDEFINED: AccuracyMetrics = AccuracyMetrics {
        mae: f64::NAN,
        rmse: f64::NAN,
        mape: f64::NAN,
    };

    pub fn is_defined(&self) -> bool {
        !self.mae.is_nan()
    }

    /// Mean of each metric over the inputs where it is defined.
    pub fn average<'a>(metrics: impl IntoIterator<Item = &'a AccuracyMetrics>) -> AccuracyMetrics {
        let mut sums = [0.0; 3];
        let mut counts = [0usize; 3];
        for m in metrics {
            for (i, v) in [m.mae, m.rmse, m.mape].into_iter().enumerate() {
                if !v.is_nan() {
                    sums[i] += v;
                    counts[i] += 1;
                }
            }
        }
        let avg = |i: usize| {
            if counts[i] == 0 {
                f64::NAN
            } else {
                round2(sums[i] / counts[i] as f64)
            }
        };
        AccuracyMetrics {
            mae: avg(0),
            rmse: avg(1),
            mape: avg(2),
        }
    }
}

impl core::fmt::Display for AccuracyMetrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "MAE={} RMSE={} MAPE={}%", self.mae, self.rmse, self.mape)
    }
}

/// Rolling-origin cross-validation: the model is refitted on everything before
/// each cutoff and scored on the `horizon_days` that follow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossValidationConfig {
    /// History required before the earliest cutoff.
    pub initial_days: u32,
    /// Spacing between consecutive cutoffs.
    pub period_days: u32,
    pub horizon_days: u32,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            initial_days: 120,
            period_days: 14,
            horizon_days: 28,
        }
    }
}

impl CrossValidationConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.initial_days == 0 || self.period_days == 0 || self.horizon_days == 0 {
            return Err(ForecastError::invalid_config(
                "cross-validation initial, period and horizon days must be positive",
            ));
        }
        Ok(())
    }

    /// Cutoffs for a history covering `[start, end]`, oldest first.
    ///
    /// The latest cutoff leaves exactly `horizon_days` to score; earlier ones
    /// step back by `period_days` while `initial_days` remain before them.
    pub fn cutoffs(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let earliest = start + Duration::days(i64::from(self.initial_days));
        let step = Duration::days(i64::from(self.period_days));
        let mut cutoff = end + Duration::days(1) - Duration::days(i64::from(self.horizon_days));
        let mut cutoffs = Vec::new();
        while cutoff >= earliest {
            cutoffs.push(cutoff);
            cutoff -= step;
        }
        cutoffs.reverse();
        cutoffs
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct ModelEvaluator;

impl ModelEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Align by index, dropping pairs where either side is missing or non-finite.
    pub fn evaluate(&self, actual: &[Option<f64>], predicted: &[Option<f64>]) -> AccuracyMetrics {
        let pairs = actual
            .iter()
            .zip(predicted)
            .filter_map(|(a, p)| match (a, p) {
                (Some(a), Some(p)) if a.is_finite() && p.is_finite() => Some((*a, *p)),
                _ => None,
            });
        metrics_from_pairs(pairs)
    }

    /// Align a hold-out series with forecast points by date.
    pub fn evaluate_forecast(&self, actual: &ObservationSeries, predicted: &[ForecastPoint]) -> AccuracyMetrics {
        let by_date: BTreeMap<NaiveDate, f64> = predicted.iter().map(|p| (p.date, p.value)).collect();
        let pairs = actual
            .iter()
            .filter_map(|obs| by_date.get(&obs.date).map(|p| (obs.quantity, *p)));
        metrics_from_pairs(pairs)
    }
}

fn metrics_from_pairs(pairs: impl Iterator<Item = (f64, f64)>) -> AccuracyMetrics {
    let mut n = 0usize;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    let mut pct_n = 0usize;

    for (actual, predicted) in pairs {
        let err = actual - predicted;
        n += 1;
        abs_sum += err.abs();
        sq_sum += err * err;
        if actual != 0.0 {
            pct_sum += (err / actual).abs();
            pct_n += 1;
        }
    }

    if n == 0 {
        return AccuracyMetrics::UNDEFINED;
    }
    AccuracyMetrics {
        mae: round2(abs_sum / n as f64),
        rmse: round2((sq_sum / n as f64).sqrt()),
        mape: if pct_n == 0 {
            f64::NAN
        } else {
            round2(pct_sum / pct_n as f64 * 100.0)
        },
    }
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn computes_reference_metrics() {
        let actual = [Some(10.0), Some(20.0), Some(0.0), Some(5.0)];
        let predicted = [Some(12.0), Some(18.0), Some(1.0), None];

        let m = ModelEvaluator::new().evaluate(&actual, &predicted);
        // pairs: (10,12), (20,18), (0,1)
        assert_relative_eq!(m.mae, 1.67);
        assert_relative_eq!(m.rmse, 1.73);
        // MAPE over non-zero actuals only: (0.2 + 0.1) / 2 = 15%
        assert_relative_eq!(m.mape, 15.0);
    }

    #[test]
    fn all_zero_actuals_leave_mape_undefined() {
        let m = ModelEvaluator::new().evaluate(&[Some(0.0), Some(0.0)], &[Some(1.0), Some(3.0)]);
        assert_relative_eq!(m.mae, 2.0);
        assert!(m.mape.is_nan());
    }

    #[test]
    fn no_pairs_leave_everything_undefined() {
        let m = ModelEvaluator::new().evaluate(&[None, Some(1.0)], &[Some(2.0)]);
        assert!(!m.is_defined());
        assert!(m.rmse.is_nan() && m.mape.is_nan());
    }

    #[test]
    fn undefined_metrics_serialize_as_null() {
        let json = serde_json::to_value(AccuracyMetrics::UNDEFINED).unwrap();
        assert_eq!(json, serde_json::json!({"mae": null, "rmse": null, "mape": null}));
        let back: AccuracyMetrics = serde_json::from_value(json).unwrap();
        assert!(back.mae.is_nan());
    }

    #[test]
    fn forecast_alignment_is_by_date() {
        let start = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let actual = ObservationSeries::from_values(start, vec![4.0, 8.0]);
        let predicted = vec![
            ForecastPoint::from_raw(start.succ_opt().unwrap(), 6.0, 5.0, 7.0),
            ForecastPoint::from_raw(NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(), 1.0, 0.0, 2.0),
        ];
        let m = ModelEvaluator::new().evaluate_forecast(&actual, &predicted);
        assert_relative_eq!(m.mae, 2.0);
        assert_relative_eq!(m.mape, 25.0);
    }

    #[test]
    fn cutoffs_step_back_from_the_last_full_horizon() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = start + Duration::days(179);
        let cutoffs = CrossValidationConfig::default().cutoffs(start, end);

        let offsets: Vec<i64> = cutoffs.iter().map(|c| (*c - start).num_days()).collect();
        assert_eq!(offsets, vec![124, 138, 152]);
        assert_eq!(*cutoffs.last().unwrap() + Duration::days(28), end + Duration::days(1));
    }

    #[test]
    fn short_histories_have_no_cutoffs() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let config = CrossValidationConfig::default();
        assert!(config.cutoffs(start, start + Duration::days(146)).is_empty());
        assert_eq!(config.cutoffs(start, start + Duration::days(147)).len(), 1);

        let zero = CrossValidationConfig {
            period_days: 0,
            ..CrossValidationConfig::default()
        };
        assert!(matches!(zero.validate(), Err(ForecastError::InvalidConfig(_))));
    }

    #[test]
    fn averages_skip_undefined_entries() {
        let a = AccuracyMetrics { mae: 1.0, rmse: 2.0, mape: f64::NAN };
        let b = AccuracyMetrics { mae: 3.0, rmse: 4.0, mape: 10.0 };
        let avg = AccuracyMetrics::average([&a, &b, &AccuracyMetrics::UNDEFINED]);
        assert_relative_eq!(avg.mae, 2.0);
        assert_relative_eq!(avg.rmse, 3.0);
        assert_relative_eq!(avg.mape, 10.0);
    }
}
