//! Forecast output types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineResult, ForecastError};
use crate::id::Subject;

/// Longest horizon any request may ask for.
pub const MAX_HORIZON_DAYS: u32 = 365;

/// Reject horizons outside `1..=MAX_HORIZON_DAYS`.
pub fn validate_horizon(horizon_days: u32) -> EngineResult<()> {
    if horizon_days == 0 || horizon_days > MAX_HORIZON_DAYS {
        return Err(ForecastError::InvalidHorizon {
            requested: horizon_days,
            max: MAX_HORIZON_DAYS,
        });
    }
    Ok(())
}

/// Round half away from zero to two decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Probability mass the `[lower, upper]` band is designed to cover.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceLevel(f64);

impl ConfidenceLevel {
    pub const DEFAULT: ConfidenceLevel = ConfidenceLevel(0.95);

    pub fn new(level: f64) -> EngineResult<Self> {
        if !(level.is_finite() && level > 0.0 && level < 1.0) {
            return Err(ForecastError::validation(format!(
                "confidence level must lie strictly between 0 and 1 (got {level})"
            )));
        }
        Ok(Self(level))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<f64> for ConfidenceLevel {
    type Error = ForecastError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConfidenceLevel> for f64 {
    fn from(value: ConfidenceLevel) -> Self {
        value.0
    }
}

/// One forecast day.
///
/// Invariant: `0 <= lower_bound <= value <= upper_bound`, all rounded to two
/// decimals.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl ForecastPoint {
    /// Build from raw model output: clamps at zero, restores ordering if the
    /// band was produced inverted, and rounds to two decimals.
    pub fn from_raw(date: NaiveDate, value: f64, lower: f64, upper: f64) -> Self {
        let clamp = |x: f64| if x.is_finite() { x.max(0.0) } else { 0.0 };
        let value = clamp(value);
        let lower = clamp(lower).min(value);
        let upper = clamp(upper).max(value);
        Self {
            date,
            value: round2(value),
            lower_bound: round2(lower),
            upper_bound: round2(upper),
        }
    }

    pub fn half_width(&self) -> f64 {
        (self.upper_bound - self.lower_bound) / 2.0
    }
}

/// Which fitting strategy produced a forecast; the two derive their bands
/// differently.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Trend + seasonality + holidays + regressors; bands from the model's
    /// predictive distribution.
    Decomposition,
    /// Trend-adjusted exponential smoothing; bands `z * sigma * sqrt(h)`.
    ExponentialSmoothing,
}

impl core::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StrategyKind::Decomposition => f.write_str("decomposition"),
            StrategyKind::ExponentialSmoothing => f.write_str("exponential_smoothing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// The subject the caller asked about.
    pub subject: Subject,
    /// The subject whose model produced the points (differs on category fallback).
    pub modeled_subject: Subject,
    pub points: Vec<ForecastPoint>,
    pub generated_at: DateTime<Utc>,
    pub horizon_days: u32,
    pub historical_avg_daily_demand: f64,
    pub confidence_level: ConfidenceLevel,
    pub strategy: StrategyKind,
    /// Non-fatal notes, e.g. regressors that were defaulted for the horizon.
    pub warnings: Vec<String>,
}

impl ForecastResult {
    pub fn used_category_fallback(&self) -> bool {
        self.subject != self.modeled_subject
    }

    pub fn total_demand(&self) -> f64 {
        self.points.iter().map(|p| p.value).sum()
    }
}

/// One row of the persisted forecast cache, keyed by `(subject, forecast_date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedForecast {
    pub subject: Subject,
    pub forecast_date: NaiveDate,
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub generated_at: DateTime<Utc>,
}

impl CachedForecast {
    pub fn from_point(subject: &Subject, point: &ForecastPoint, generated_at: DateTime<Utc>) -> Self {
        Self {
            subject: subject.clone(),
            forecast_date: point.date,
            value: point.value,
            lower_bound: point.lower_bound,
            upper_bound: point.upper_bound,
            generated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn horizon_bounds() {
        assert!(validate_horizon(1).is_ok());
        assert!(validate_horizon(365).is_ok());
        assert_eq!(
            validate_horizon(400).unwrap_err(),
            ForecastError::InvalidHorizon { requested: 400, max: 365 }
        );
        assert!(validate_horizon(0).is_err());
    }

    #[test]
    fn confidence_level_must_be_open_unit_interval() {
        assert!(ConfidenceLevel::new(0.8).is_ok());
        assert!(ConfidenceLevel::new(1.0).is_err());
        assert!(ConfidenceLevel::new(0.0).is_err());
        assert!(serde_json::from_str::<ConfidenceLevel>("1.5").is_err());
        assert_eq!(serde_json::to_string(&ConfidenceLevel::DEFAULT).unwrap(), "0.95");
    }

    #[test]
    fn raw_output_is_clamped_and_rounded() {
        let p = ForecastPoint::from_raw(d(2026, 6, 1), 3.14159, -2.0, 7.006);
        assert_eq!(p.value, 3.14);
        assert_eq!(p.lower_bound, 0.0);
        assert_eq!(p.upper_bound, 7.01);

        let negative = ForecastPoint::from_raw(d(2026, 6, 1), -4.0, -6.0, -1.0);
        assert_eq!((negative.lower_bound, negative.value, negative.upper_bound), (0.0, 0.0, 0.0));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: any raw triple yields an ordered, non-negative point.
        #[test]
        fn points_are_ordered_and_non_negative(
            value in -1e6f64..1e6,
            lower in -1e6f64..1e6,
            upper in -1e6f64..1e6
        ) {
            let p = ForecastPoint::from_raw(d(2026, 1, 1), value, lower, upper);
            prop_assert!(p.lower_bound >= 0.0);
            prop_assert!(p.lower_bound <= p.value);
            prop_assert!(p.value <= p.upper_bound);
        }
    }
}
