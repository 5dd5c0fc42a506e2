//! Trend + seasonality + holiday + regressor decomposition.
//!
//! Components:
//! - piecewise-linear trend with changepoints spread over the first part of
//!   the history;
//! - Fourier seasonality: weekly, yearly (only with a year of history) and a
//!   30.5-day monthly cycle;
//! - one indicator per holiday name seen in training;
//! - exogenous regressors, standardised unless binary.
//!
//! Coefficients carry Gaussian priors, so the fit is a ridge regression with
//! `λ = 1 / prior_scale²` solved by Cholesky. Multiplicative mode fits on the
//! `ln(1 + y)` scale. Bands come from the predictive distribution
//! `z · σ · sqrt(1 + xᵀA⁻¹x)`.

use std::f64::consts::PI;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stockcast_core::{EngineResult, ForecastError, ForecastPoint, StrategyKind, Subject};

use super::Forecaster;
use super::linalg::{inverse_quadratic_form, ridge};
use crate::features::{FeatureRow, Regressor};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    pub mode: SeasonalityMode,
    pub weekly_order: usize,
    pub yearly_order: usize,
    /// Yearly seasonality is only fitted with at least this much history.
    pub yearly_min_history_days: usize,
    pub monthly_order: usize,
    pub monthly_period: f64,
    pub n_changepoints: usize,
    /// Fraction of the history in which changepoints may be placed.
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub holidays_prior_scale: f64,
    pub regressor_prior_scale: f64,
    pub trend_prior_scale: f64,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            mode: SeasonalityMode::Multiplicative,
            weekly_order: 3,
            yearly_order: 10,
            yearly_min_history_days: 365,
            monthly_order: 5,
            monthly_period: 30.5,
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            holidays_prior_scale: 10.0,
            regressor_prior_scale: 0.5,
            trend_prior_scale: 5.0,
        }
    }
}

impl DecompositionConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::invalid_config(
                "changepoint_range must lie in (0, 1]",
            ));
        }
        if !(self.monthly_period.is_finite() && self.monthly_period > 0.0) {
            return Err(ForecastError::invalid_config("monthly_period must be positive"));
        }
        let scales = [
            self.changepoint_prior_scale,
            self.seasonality_prior_scale,
            self.holidays_prior_scale,
            self.regressor_prior_scale,
            self.trend_prior_scale,
        ];
        if scales.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(ForecastError::invalid_config(
                "prior scales must be finite and positive",
            ));
        }
        Ok(())
    }
}

const WEEKLY_PERIOD: f64 = 7.0;
const YEARLY_PERIOD: f64 = 365.25;
const INTERCEPT_PENALTY: f64 = 1e-6;
/// Keeps `exp_m1` finite for pathological multiplicative bands.
const MAX_LOG_SCALE: f64 = 700.0;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
struct Seasonality {
    period: f64,
    order: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
struct RegressorScaling {
    regressor: Regressor,
    mean: f64,
    std: f64,
}

impl RegressorScaling {
    fn fit(regressor: Regressor, rows: &[FeatureRow]) -> Self {
        if regressor.is_binary() {
            return Self { regressor, mean: 0.0, std: 1.0 };
        }
        let xs: Vec<f64> = rows.iter().map(|r| regressor.value(r).unwrap_or(0.0)).collect();
        let n = xs.len().max(1) as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let var = if xs.len() > 1 {
            xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        let std = var.sqrt();
        Self {
            regressor,
            mean,
            std: if std > f64::EPSILON { std } else { 1.0 },
        }
    }

    fn apply(&self, row: &FeatureRow) -> f64 {
        (self.regressor.value(row).unwrap_or(0.0) - self.mean) / self.std
    }
}

/// Fitted decomposition parameters. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionModel {
    mode: SeasonalityMode,
    history_start: NaiveDate,
    history_end: NaiveDate,
    /// Days spanned by the history; trend time is scaled to `[0, 1]`.
    time_scale: f64,
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
    holidays: Vec<String>,
    regressors: Vec<RegressorScaling>,
    y_scale: f64,
    coefficients: Vec<f64>,
    cholesky_lower: Vec<f64>,
    sigma: f64,
}

impl DecompositionModel {
    /// Fit against historical feature rows using the given regressors.
    pub fn fit(
        subject: &Subject,
        rows: &[FeatureRow],
        regressors: &[Regressor],
        config: &DecompositionConfig,
    ) -> EngineResult<Self> {
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Err(ForecastError::model_fit(subject, "empty training history"));
        };
        let n = rows.len();
        let time_scale = ((last.date - first.date).num_days() as f64).max(1.0);

        let mut seasonalities = vec![Seasonality {
            period: WEEKLY_PERIOD,
            order: config.weekly_order,
        }];
        if n >= config.yearly_min_history_days {
            seasonalities.push(Seasonality {
                period: YEARLY_PERIOD,
                order: config.yearly_order,
            });
        }
        seasonalities.push(Seasonality {
            period: config.monthly_period,
            order: config.monthly_order,
        });
        seasonalities.retain(|s| s.order > 0);

        let mut holidays: Vec<String> = rows.iter().filter_map(|r| r.holiday.clone()).collect();
        holidays.sort();
        holidays.dedup();

        let mut model = Self {
            mode: config.mode,
            history_start: first.date,
            history_end: last.date,
            time_scale,
            changepoints: changepoint_grid(n, config),
            seasonalities,
            holidays,
            regressors: regressors
                .iter()
                .map(|&r| RegressorScaling::fit(r, rows))
                .collect(),
            y_scale: 1.0,
            coefficients: Vec::new(),
            cholesky_lower: Vec::new(),
            sigma: 0.0,
        };

        let transformed: Vec<f64> = rows.iter().map(|r| model.forward(r.quantity)).collect();
        let y_scale = transformed.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        model.y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let target: Vec<f64> = transformed.iter().map(|v| v / model.y_scale).collect();

        let design: Vec<Vec<f64>> = rows.iter().map(|r| model.design_row(r)).collect();
        let penalties = model.penalties(config);
        let solution = ridge(&design, &target, &penalties).ok_or_else(|| {
            ForecastError::model_fit(subject, "normal equations are not positive definite")
        })?;

        let dof = n.saturating_sub(penalties.len()).max(1) as f64;
        model.sigma = (solution.rss / dof).sqrt();
        model.coefficients = solution.coefficients;
        model.cholesky_lower = solution.lower;

        debug!(
            subject = %subject,
            rows = n,
            columns = penalties.len(),
            changepoints = model.changepoints.len(),
            holidays = model.holidays.len(),
            sigma = model.sigma,
            "fitted decomposition model"
        );
        Ok(model)
    }

    pub fn regressors(&self) -> Vec<Regressor> {
        self.regressors.iter().map(|r| r.regressor).collect()
    }

    pub fn holidays(&self) -> &[String] {
        &self.holidays
    }

    /// In-sample fitted values on the original scale.
    pub fn fitted(&self, rows: &[FeatureRow]) -> Vec<f64> {
        rows.iter().map(|r| self.inverse(self.linear(&self.design_row(r)))).collect()
    }

    fn forward(&self, y: f64) -> f64 {
        match self.mode {
            SeasonalityMode::Additive => y,
            SeasonalityMode::Multiplicative => y.max(0.0).ln_1p(),
        }
    }

    fn inverse(&self, scaled: f64) -> f64 {
        let v = scaled * self.y_scale;
        match self.mode {
            SeasonalityMode::Additive => v,
            SeasonalityMode::Multiplicative => v.min(MAX_LOG_SCALE).exp_m1(),
        }
    }

    fn linear(&self, x: &[f64]) -> f64 {
        x.iter().zip(&self.coefficients).map(|(a, b)| a * b).sum()
    }

    fn design_row(&self, row: &FeatureRow) -> Vec<f64> {
        let t = (row.date - self.history_start).num_days() as f64 / self.time_scale;
        let epoch_days = (row.date - epoch()).num_days() as f64;

        let mut x = Vec::with_capacity(self.column_count());
        x.push(1.0);
        x.push(t);
        x.extend(self.changepoints.iter().map(|c| (t - c).max(0.0)));
        for s in &self.seasonalities {
            for k in 1..=s.order {
                let angle = 2.0 * PI * k as f64 * epoch_days / s.period;
                x.push(angle.sin());
                x.push(angle.cos());
            }
        }
        x.extend(
            self.holidays
                .iter()
                .map(|h| if row.holiday.as_deref() == Some(h.as_str()) { 1.0 } else { 0.0 }),
        );
        x.extend(self.regressors.iter().map(|r| r.apply(row)));
        x
    }

    fn column_count(&self) -> usize {
        2 + self.changepoints.len()
            + self.seasonalities.iter().map(|s| 2 * s.order).sum::<usize>()
            + self.holidays.len()
            + self.regressors.len()
    }

    fn penalties(&self, config: &DecompositionConfig) -> Vec<f64> {
        let lambda = |scale: f64| 1.0 / (scale * scale);
        let mut p = vec![INTERCEPT_PENALTY, lambda(config.trend_prior_scale)];
        p.extend(std::iter::repeat_n(
            lambda(config.changepoint_prior_scale),
            self.changepoints.len(),
        ));
        let fourier: usize = self.seasonalities.iter().map(|s| 2 * s.order).sum();
        p.extend(std::iter::repeat_n(lambda(config.seasonality_prior_scale), fourier));
        p.extend(std::iter::repeat_n(lambda(config.holidays_prior_scale), self.holidays.len()));
        p.extend(std::iter::repeat_n(
            lambda(config.regressor_prior_scale),
            self.regressors.len(),
        ));
        p
    }
}

impl Forecaster for DecompositionModel {
    fn strategy(&self) -> StrategyKind {
        StrategyKind::Decomposition
    }

    fn history_end(&self) -> NaiveDate {
        self.history_end
    }

    fn predict(&self, future: &[FeatureRow], z: f64) -> EngineResult<Vec<ForecastPoint>> {
        future
            .iter()
            .map(|row| {
                let x = self.design_row(row);
                let mean = self.linear(&x);
                let leverage = inverse_quadratic_form(&self.cholesky_lower, &x).ok_or_else(|| {
                    ForecastError::ArtifactCorrupt("decomposition factor does not match its design".into())
                })?;
                let margin = z * self.sigma * (1.0 + leverage).sqrt();
                Ok(ForecastPoint::from_raw(
                    row.date,
                    self.inverse(mean),
                    self.inverse(mean - margin),
                    self.inverse(mean + margin),
                ))
            })
            .collect()
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Changepoint locations in scaled time: evenly spaced over the first
/// `changepoint_range` of the history, excluding its first day.
fn changepoint_grid(n: usize, config: &DecompositionConfig) -> Vec<f64> {
    if n < 3 {
        return Vec::new();
    }
    let hist = ((n as f64) * config.changepoint_range).floor() as usize;
    let count = config.n_changepoints.min(hist.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }
    let last_index = (hist - 1) as f64;
    let span = (n - 1) as f64;
    (1..=count)
        .map(|i| (last_index * i as f64 / count as f64).round() / span)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureEngineer, RegressorContract};
    use proptest::prelude::*;
    use stockcast_core::{CalendarEvent, CalendarEvents, EventKind, ObservationSeries};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn subject() -> Subject {
        Subject::sku("SAR-001").unwrap()
    }

    fn weekly_pattern(days: usize) -> Vec<f64> {
        (0..days)
            .map(|i| 20.0 + if i % 7 == 5 || i % 7 == 6 { 15.0 } else { 0.0 } + (i as f64) * 0.05)
            .collect()
    }

    #[test]
    fn tracks_a_weekly_pattern_in_sample() {
        let series = ObservationSeries::from_values(d(2025, 6, 2), weekly_pattern(140));
        let rows = FeatureEngineer::default().engineer(&series, &CalendarEvents::default(), &[], &subject());
        let model = DecompositionModel::fit(&subject(), &rows, &[], &DecompositionConfig::default()).unwrap();

        let fitted = model.fitted(&rows);
        let mae = rows
            .iter()
            .zip(&fitted)
            .map(|(r, f)| (r.quantity - f).abs())
            .sum::<f64>()
            / rows.len() as f64;
        assert!(mae < 3.0, "in-sample MAE too large: {mae}");
    }

    #[test]
    fn holiday_names_become_indicator_columns() {
        let series = ObservationSeries::from_values(d(2025, 9, 1), weekly_pattern(90));
        let events = CalendarEvents::new(vec![
            CalendarEvent::new(d(2025, 10, 2), "Gandhi Jayanti", EventKind::Holiday).unwrap(),
            CalendarEvent::new(d(2025, 10, 12), "Diwali", EventKind::Festival).unwrap(),
        ]);
        let rows = FeatureEngineer::default().engineer(&series, &events, &[], &subject());
        let model = DecompositionModel::fit(&subject(), &rows, &[], &DecompositionConfig::default()).unwrap();

        assert_eq!(model.holidays(), &["Diwali".to_string(), "Gandhi Jayanti".to_string()]);
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let series = ObservationSeries::from_values(d(2025, 6, 2), weekly_pattern(90));
        let rows = FeatureEngineer::default().engineer(&series, &CalendarEvents::default(), &[], &subject());
        let regressors = RegressorContract::for_subject(&subject());
        let model =
            DecompositionModel::fit(&subject(), &rows, regressors.regressors(), &DecompositionConfig::default())
                .unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let back: DecompositionModel = serde_json::from_str(&json).unwrap();
        let future = FeatureEngineer::default().engineer_future(
            d(2025, 8, 31),
            7,
            &CalendarEvents::default(),
            None,
            &subject(),
        );
        assert_eq!(model.predict(&future, 1.96).unwrap(), back.predict(&future, 1.96).unwrap());
    }

    #[test]
    fn yearly_terms_need_a_full_year() {
        let config = DecompositionConfig::default();
        let short = ObservationSeries::from_values(d(2025, 1, 1), weekly_pattern(200));
        let long = ObservationSeries::from_values(d(2024, 1, 1), weekly_pattern(400));
        let engineer = FeatureEngineer::default();
        let events = CalendarEvents::default();

        let short_model = DecompositionModel::fit(
            &subject(),
            &engineer.engineer(&short, &events, &[], &subject()),
            &[],
            &config,
        )
        .unwrap();
        let long_model = DecompositionModel::fit(
            &subject(),
            &engineer.engineer(&long, &events, &[], &subject()),
            &[],
            &config,
        )
        .unwrap();

        assert_eq!(long_model.column_count() - short_model.column_count(), 2 * config.yearly_order);
    }

    #[test]
    fn changepoints_stay_inside_the_range() {
        let config = DecompositionConfig::default();
        let grid = changepoint_grid(180, &config);
        assert_eq!(grid.len(), 25);
        assert!(grid.iter().all(|c| *c > 0.0 && *c <= 0.8));
        assert!(changepoint_grid(2, &config).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        })]

        /// Property: predictions are ordered and non-negative in both modes.
        #[test]
        fn predictions_are_ordered(
            values in prop::collection::vec(0.0f64..200.0, 60..150),
            additive in any::<bool>()
        ) {
            let config = DecompositionConfig {
                mode: if additive { SeasonalityMode::Additive } else { SeasonalityMode::Multiplicative },
                ..DecompositionConfig::default()
            };
            let series = ObservationSeries::from_values(d(2025, 3, 1), values);
            let engineer = FeatureEngineer::default();
            let rows = engineer.engineer(&series, &CalendarEvents::default(), &[], &subject());
            let contract = RegressorContract::for_subject(&subject());
            let model = DecompositionModel::fit(&subject(), &rows, contract.regressors(), &config).unwrap();

            let start = series.end().unwrap() + chrono::Duration::days(1);
            let future = engineer.engineer_future(start, 30, &CalendarEvents::default(), None, &subject());
            for p in model.predict(&future, 1.96).unwrap() {
                prop_assert!(0.0 <= p.lower_bound);
                prop_assert!(p.lower_bound <= p.value && p.value <= p.upper_bound);
            }
        }
    }
}
