//! Calendar, promotion, seasonal and autoregressive covariates.
//!
//! The transform is pure: identical inputs always produce identical rows.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use stockcast_core::{CalendarEvents, EngineResult, ForecastError, ObservationSeries, PromotionWindow, Subject};

/// Month-based demand seasons for the ethnic-wear market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonProfile {
    /// Peak season (weddings): October through February.
    pub wedding_months: Vec<u32>,
    /// Secondary season (Raksha Bandhan, Navratri, Diwali): August through November.
    pub festival_months: Vec<u32>,
    pub wedding_weight: f64,
    pub festival_weight: f64,
}

impl Default for SeasonProfile {
    fn default() -> Self {
        Self {
            wedding_months: vec![10, 11, 12, 1, 2],
            festival_months: vec![8, 9, 10, 11],
            wedding_weight: 0.6,
            festival_weight: 0.4,
        }
    }
}

impl SeasonProfile {
    pub fn validate(&self) -> EngineResult<()> {
        let months = self.wedding_months.iter().chain(self.festival_months.iter());
        if let Some(bad) = months.copied().find(|m| !(1..=12).contains(m)) {
            return Err(ForecastError::invalid_config(format!(
                "season month {bad} is outside 1..=12"
            )));
        }
        for w in [self.wedding_weight, self.festival_weight] {
            if !(w.is_finite() && w >= 0.0) {
                return Err(ForecastError::invalid_config(
                    "season weights must be finite and non-negative",
                ));
            }
        }
        let total = self.wedding_weight + self.festival_weight;
        if (total - 1.0).abs() > 1e-9 {
            return Err(ForecastError::invalid_config(format!(
                "season weights must sum to 1.0 (got {total})"
            )));
        }
        Ok(())
    }

    pub fn is_wedding_season(&self, date: NaiveDate) -> bool {
        self.wedding_months.contains(&date.month())
    }

    pub fn is_festival_season(&self, date: NaiveDate) -> bool {
        self.festival_months.contains(&date.month())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Lag offsets in days.
    pub lags: Vec<usize>,
    /// Trailing rolling-window lengths in days.
    pub rolling_windows: Vec<usize>,
    pub seasons: SeasonProfile,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lags: vec![7, 14, 30],
            rolling_windows: vec![7, 30],
            seasons: SeasonProfile::default(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.lags.contains(&0) {
            return Err(ForecastError::invalid_config("lag offsets must be positive"));
        }
        if self.rolling_windows.contains(&0) {
            return Err(ForecastError::invalid_config("rolling windows must be positive"));
        }
        self.seasons.validate()
    }
}

/// One engineered row per date.
///
/// Rows built for the forecast horizon carry `quantity = 0` and zeroed
/// lag/rolling statistics: future demand is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub quantity: f64,
    pub is_holiday: bool,
    /// Name of the holiday on this date, used to key holiday effects.
    pub holiday: Option<String>,
    pub is_promo: bool,
    pub is_wedding_season: bool,
    pub is_festival_season: bool,
    pub season_intensity: f64,
    pub lags: BTreeMap<usize, f64>,
    pub rolling_mean: BTreeMap<usize, f64>,
    pub rolling_std: BTreeMap<usize, f64>,
}

impl FeatureRow {
    pub fn lag(&self, k: usize) -> Option<f64> {
        self.lags.get(&k).copied()
    }

    pub fn rolling_mean(&self, window: usize) -> Option<f64> {
        self.rolling_mean.get(&window).copied()
    }

    pub fn rolling_std(&self, window: usize) -> Option<f64> {
        self.rolling_std.get(&window).copied()
    }
}

/// Exogenous covariates a model may be fitted against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regressor {
    IsPromo,
    IsWeddingSeason,
    IsFestivalSeason,
    #[serde(rename = "y_lag_7")]
    YLag7,
    #[serde(rename = "y_rolling_mean_7")]
    YRollingMean7,
}

impl Regressor {
    pub fn name(self) -> &'static str {
        match self {
            Regressor::IsPromo => "is_promo",
            Regressor::IsWeddingSeason => "is_wedding_season",
            Regressor::IsFestivalSeason => "is_festival_season",
            Regressor::YLag7 => "y_lag_7",
            Regressor::YRollingMean7 => "y_rolling_mean_7",
        }
    }

    /// 0/1 indicators are fed to the model unscaled.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Regressor::IsPromo | Regressor::IsWeddingSeason | Regressor::IsFestivalSeason
        )
    }

    /// Value on a row, or `None` when the row lacks the underlying feature.
    pub fn value(self, row: &FeatureRow) -> Option<f64> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            Regressor::IsPromo => Some(flag(row.is_promo)),
            Regressor::IsWeddingSeason => Some(flag(row.is_wedding_season)),
            Regressor::IsFestivalSeason => Some(flag(row.is_festival_season)),
            Regressor::YLag7 => row.lag(7),
            Regressor::YRollingMean7 => row.rolling_mean(7),
        }
    }

    /// Whether the value is known for future dates without observing demand.
    fn known_in_advance(self) -> bool {
        matches!(self, Regressor::IsWeddingSeason | Regressor::IsFestivalSeason)
    }
}

impl core::fmt::Display for Regressor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorStatus {
    Present,
    /// Not available; the model saw 0 in its place.
    Defaulted,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressorUsage {
    pub regressor: Regressor,
    pub status: RegressorStatus,
}

impl RegressorUsage {
    pub fn warning(&self, stage: &str) -> Option<String> {
        match self.status {
            RegressorStatus::Present => None,
            RegressorStatus::Defaulted => Some(format!(
                "regressor {} unavailable for {stage}; defaulted to 0",
                self.regressor
            )),
        }
    }
}

/// The fixed, named set of covariates a subject's model expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressorContract {
    regressors: Vec<Regressor>,
}

impl RegressorContract {
    pub fn new(regressors: Vec<Regressor>) -> Self {
        Self { regressors }
    }

    /// SKU models use promotions and autoregressive terms; category models
    /// only the seasonal flags.
    pub fn for_subject(subject: &Subject) -> Self {
        match subject {
            Subject::Sku(_) => Self::new(vec![
                Regressor::IsPromo,
                Regressor::IsWeddingSeason,
                Regressor::IsFestivalSeason,
                Regressor::YLag7,
                Regressor::YRollingMean7,
            ]),
            Subject::Category(_) => {
                Self::new(vec![Regressor::IsWeddingSeason, Regressor::IsFestivalSeason])
            }
        }
    }

    pub fn regressors(&self) -> &[Regressor] {
        &self.regressors
    }

    pub fn is_empty(&self) -> bool {
        self.regressors.is_empty()
    }

    /// Status of each regressor over historical rows: present only if every
    /// row carries a value.
    pub fn resolve_history(&self, rows: &[FeatureRow]) -> Vec<RegressorUsage> {
        self.regressors
            .iter()
            .map(|&regressor| {
                let present = !rows.is_empty() && rows.iter().all(|r| regressor.value(r).is_some());
                RegressorUsage {
                    regressor,
                    status: if present {
                        RegressorStatus::Present
                    } else {
                        RegressorStatus::Defaulted
                    },
                }
            })
            .collect()
    }

    /// Status over the forecast horizon. Promotion flags count as present only
    /// when future promotions were supplied; demand-derived terms never are.
    pub fn resolve_future(&self, promotions_supplied: bool) -> Vec<RegressorUsage> {
        self.regressors
            .iter()
            .map(|&regressor| {
                let present = regressor.known_in_advance()
                    || (regressor == Regressor::IsPromo && promotions_supplied);
                RegressorUsage {
                    regressor,
                    status: if present {
                        RegressorStatus::Present
                    } else {
                        RegressorStatus::Defaulted
                    },
                }
            })
            .collect()
    }
}

/// Derives [`FeatureRow`]s from an assembled series.
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Historical rows, ascending by date.
    ///
    /// The first `k` rows of every lag column are 0. Rolling statistics use an
    /// expanding window until `window` observations exist; rolling std is the
    /// sample deviation and 0 with fewer than two observations.
    pub fn engineer(
        &self,
        series: &ObservationSeries,
        events: &CalendarEvents,
        promotions: &[PromotionWindow],
        subject: &Subject,
    ) -> Vec<FeatureRow> {
        let values = series.values();
        series
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                let mut row = self.calendar_row(obs.date, events, promotions, subject);
                row.quantity = obs.quantity;
                for &k in &self.config.lags {
                    let lagged = if i >= k { values[i - k] } else { 0.0 };
                    row.lags.insert(k, lagged);
                }
                for &w in &self.config.rolling_windows {
                    let from = (i + 1).saturating_sub(w);
                    let window = &values[from..=i];
                    let (mean, std) = mean_and_sample_std(window);
                    row.rolling_mean.insert(w, mean);
                    row.rolling_std.insert(w, std);
                }
                row
            })
            .collect()
    }

    /// Rows for `horizon` days starting at `start`.
    ///
    /// `promotions = None` means no future promotions were supplied: every
    /// promotion flag is 0.
    pub fn engineer_future(
        &self,
        start: NaiveDate,
        horizon: u32,
        events: &CalendarEvents,
        promotions: Option<&[PromotionWindow]>,
        subject: &Subject,
    ) -> Vec<FeatureRow> {
        let promotions = promotions.unwrap_or(&[]);
        (0..horizon)
            .map(|h| {
                let date = start + Duration::days(h as i64);
                let mut row = self.calendar_row(date, events, promotions, subject);
                for &k in &self.config.lags {
                    row.lags.insert(k, 0.0);
                }
                for &w in &self.config.rolling_windows {
                    row.rolling_mean.insert(w, 0.0);
                    row.rolling_std.insert(w, 0.0);
                }
                row
            })
            .collect()
    }

    fn calendar_row(
        &self,
        date: NaiveDate,
        events: &CalendarEvents,
        promotions: &[PromotionWindow],
        subject: &Subject,
    ) -> FeatureRow {
        let seasons = &self.config.seasons;
        let is_wedding_season = seasons.is_wedding_season(date);
        let is_festival_season = seasons.is_festival_season(date);
        let season_intensity = if is_wedding_season { seasons.wedding_weight } else { 0.0 }
            + if is_festival_season { seasons.festival_weight } else { 0.0 };

        FeatureRow {
            date,
            quantity: 0.0,
            is_holiday: events.is_holiday(date),
            holiday: events.name_on(date).map(str::to_string),
            is_promo: promotions
                .iter()
                .any(|p| p.applies_to(subject) && p.covers(date)),
            is_wedding_season,
            is_festival_season,
            season_intensity,
            lags: BTreeMap::new(),
            rolling_mean: BTreeMap::new(),
            rolling_std: BTreeMap::new(),
        }
    }
}

fn mean_and_sample_std(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    if xs.len() < 2 {
        return (mean, 0.0);
    }
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use stockcast_core::{CalendarEvent, EventKind, Sku};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sku() -> Subject {
        Subject::sku("SAR-001").unwrap()
    }

    #[test]
    fn default_season_profile_is_valid() {
        assert!(FeatureConfig::default().validate().is_ok());
        let skewed = SeasonProfile {
            wedding_weight: 0.7,
            ..SeasonProfile::default()
        };
        assert!(matches!(skewed.validate(), Err(ForecastError::InvalidConfig(_))));
    }

    #[test]
    fn calendar_and_season_flags() {
        let series = ObservationSeries::from_values(d(2025, 10, 11), vec![1.0, 2.0, 3.0]);
        let events = CalendarEvents::new(vec![
            CalendarEvent::new(d(2025, 10, 12), "Diwali", EventKind::Festival).unwrap(),
        ]);
        let promos = vec![
            PromotionWindow::new(d(2025, 10, 13), d(2025, 10, 20), None).unwrap(),
            PromotionWindow::new(
                d(2025, 10, 11),
                d(2025, 10, 11),
                Some(Sku::new("OTHER").unwrap()),
            )
            .unwrap(),
        ];

        let rows = FeatureEngineer::default().engineer(&series, &events, &promos, &sku());

        assert_eq!(rows.len(), 3);
        assert!(!rows[0].is_holiday);
        assert!(rows[1].is_holiday);
        assert_eq!(rows[1].holiday.as_deref(), Some("Diwali"));
        assert!(!rows[0].is_promo);
        assert!(rows[2].is_promo);
        // October is both wedding and festival season.
        assert!(rows[0].is_wedding_season && rows[0].is_festival_season);
        assert_relative_eq!(rows[0].season_intensity, 1.0);
    }

    #[test]
    fn rolling_statistics_use_expanding_window() {
        let series = ObservationSeries::from_values(d(2026, 3, 1), vec![2.0, 4.0, 6.0]);
        let rows = FeatureEngineer::default().engineer(&series, &CalendarEvents::default(), &[], &sku());

        assert_relative_eq!(rows[1].rolling_mean(7).unwrap(), 3.0);
        assert_relative_eq!(rows[2].rolling_std(7).unwrap(), 2.0);
        assert_eq!(rows[0].rolling_std(30), Some(0.0));
    }

    #[test]
    fn future_rows_zero_demand_terms_and_default_promotions() {
        let engineer = FeatureEngineer::default();
        let promos = vec![PromotionWindow::new(d(2026, 1, 2), d(2026, 1, 2), None).unwrap()];
        let events = CalendarEvents::default();

        let without = engineer.engineer_future(d(2026, 1, 1), 3, &events, None, &sku());
        let with = engineer.engineer_future(d(2026, 1, 1), 3, &events, Some(&promos), &sku());

        assert!(without.iter().all(|r| !r.is_promo));
        assert!(with[1].is_promo);
        assert!(with.iter().all(|r| r.lag(7) == Some(0.0) && r.rolling_mean(7) == Some(0.0)));
        assert_eq!(with.last().unwrap().date, d(2026, 1, 3));
    }

    #[test]
    fn regressor_contract_reports_defaulted_terms() {
        let contract = RegressorContract::for_subject(&sku());
        let future = contract.resolve_future(false);
        let defaulted: Vec<&str> = future
            .iter()
            .filter(|u| u.status == RegressorStatus::Defaulted)
            .map(|u| u.regressor.name())
            .collect();
        assert_eq!(defaulted, vec!["is_promo", "y_lag_7", "y_rolling_mean_7"]);

        let category = RegressorContract::for_subject(&Subject::category("sarees").unwrap());
        assert!(category
            .resolve_future(false)
            .iter()
            .all(|u| u.status == RegressorStatus::Present));
    }

    #[test]
    fn history_without_lag_seven_defaults_it() {
        let engineer = FeatureEngineer::new(FeatureConfig {
            lags: vec![14],
            ..FeatureConfig::default()
        });
        let series = ObservationSeries::from_values(d(2026, 3, 1), vec![1.0; 10]);
        let rows = engineer.engineer(&series, &CalendarEvents::default(), &[], &sku());
        let usage = RegressorContract::for_subject(&sku()).resolve_history(&rows);

        let lag7 = usage.iter().find(|u| u.regressor == Regressor::YLag7).unwrap();
        assert_eq!(lag7.status, RegressorStatus::Defaulted);
        assert!(lag7.warning("training").unwrap().contains("y_lag_7"));
    }

    #[test]
    fn regressor_names_serialize_as_column_names() {
        let json = serde_json::to_string(&vec![Regressor::YLag7, Regressor::IsPromo]).unwrap();
        assert_eq!(json, r#"["y_lag_7","is_promo"]"#);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: the first `k` rows of every lag column are 0.
        #[test]
        fn leading_lag_rows_are_zero(
            values in prop::collection::vec(0.5f64..100.0, 1..90),
            lags in prop::collection::vec(1usize..40, 1..4)
        ) {
            let engineer = FeatureEngineer::new(FeatureConfig {
                lags: lags.clone(),
                ..FeatureConfig::default()
            });
            let series = ObservationSeries::from_values(d(2025, 1, 1), values.clone());
            let rows = engineer.engineer(&series, &CalendarEvents::default(), &[], &sku());

            for k in lags {
                for (i, row) in rows.iter().enumerate() {
                    let expected = if i < k { 0.0 } else { values[i - k] };
                    prop_assert_eq!(row.lag(k), Some(expected));
                }
            }
        }

        /// Property: a one-day rolling window always has zero deviation.
        #[test]
        fn single_element_rolling_std_is_zero(
            values in prop::collection::vec(0.0f64..1_000.0, 1..60)
        ) {
            let engineer = FeatureEngineer::new(FeatureConfig {
                rolling_windows: vec![1],
                ..FeatureConfig::default()
            });
            let series = ObservationSeries::from_values(d(2025, 1, 1), values);
            let rows = engineer.engineer(&series, &CalendarEvents::default(), &[], &sku());

            prop_assert!(rows.iter().all(|r| r.rolling_std(1) == Some(0.0)));
        }
    }
}
