//! Engine configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use stockcast_core::{ConfidenceLevel, EngineResult, ForecastError};

use crate::evaluate::CrossValidationConfig;
use crate::features::FeatureConfig;
use crate::model::{DecompositionConfig, ForecastModel, SeasonalityMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Days of history assembled before the forecast start.
    pub lookback_days: u32,
    /// Distinct sale-days below which a SKU is sparse.
    pub min_sale_days: u32,
    /// Trailing days held out when evaluating a training run.
    pub holdout_days: u32,
    pub confidence_level: ConfidenceLevel,
    pub smoothing_alpha: f64,
    /// Subjects forecast per interactive summary request.
    pub summary_cap: usize,
    /// Substitute the category model for sparse SKUs.
    pub category_fallback: bool,
    /// Fit on demand when a subject has no stored model.
    pub train_on_missing: bool,
    /// Upsert batch forecasts into the forecast cache.
    pub cache_forecasts: bool,
    /// Per-subject pipeline timeout inside batches.
    pub subject_timeout_secs: Option<u64>,
    pub cross_validation: CrossValidationConfig,
    pub features: FeatureConfig,
    pub decomposition: DecompositionConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            lookback_days: 180,
            min_sale_days: 60,
            holdout_days: 28,
            confidence_level: ConfidenceLevel::DEFAULT,
            smoothing_alpha: 0.3,
            summary_cap: 20,
            category_fallback: true,
            train_on_missing: false,
            cache_forecasts: true,
            subject_timeout_secs: None,
            cross_validation: CrossValidationConfig::default(),
            features: FeatureConfig::default(),
            decomposition: DecompositionConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// Defaults overridden by `STOCKCAST_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Unparsable values are
    /// logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        override_with(&lookup, "STOCKCAST_LOOKBACK_DAYS", &mut config.lookback_days);
        override_with(&lookup, "STOCKCAST_MIN_SALE_DAYS", &mut config.min_sale_days);
        override_with(&lookup, "STOCKCAST_HOLDOUT_DAYS", &mut config.holdout_days);
        override_with(&lookup, "STOCKCAST_SMOOTHING_ALPHA", &mut config.smoothing_alpha);
        override_with(&lookup, "STOCKCAST_SUMMARY_CAP", &mut config.summary_cap);
        override_with(&lookup, "STOCKCAST_CATEGORY_FALLBACK", &mut config.category_fallback);
        override_with(&lookup, "STOCKCAST_TRAIN_ON_MISSING", &mut config.train_on_missing);
        override_with(&lookup, "STOCKCAST_CACHE_FORECASTS", &mut config.cache_forecasts);

        let mut level = config.confidence_level.value();
        override_with(&lookup, "STOCKCAST_CONFIDENCE_LEVEL", &mut level);
        match ConfidenceLevel::new(level) {
            Ok(level) => config.confidence_level = level,
            Err(e) => tracing::warn!(error = %e, "ignoring STOCKCAST_CONFIDENCE_LEVEL"),
        }

        let mut timeout = 0u64;
        override_with(&lookup, "STOCKCAST_SUBJECT_TIMEOUT_SECS", &mut timeout);
        config.subject_timeout_secs = (timeout > 0).then_some(timeout);

        if let Some(mode) = lookup("STOCKCAST_SEASONALITY_MODE") {
            match mode.trim().to_ascii_lowercase().as_str() {
                "additive" => config.decomposition.mode = SeasonalityMode::Additive,
                "multiplicative" => config.decomposition.mode = SeasonalityMode::Multiplicative,
                other => tracing::warn!(value = other, "unknown STOCKCAST_SEASONALITY_MODE; keeping default"),
            }
        }

        config
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ForecastError::invalid_config(format!("config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.lookback_days == 0 {
            return Err(ForecastError::invalid_config("lookback_days must be positive"));
        }
        if self.holdout_days == 0 || self.holdout_days >= self.lookback_days {
            return Err(ForecastError::invalid_config(format!(
                "holdout_days ({}) must be positive and shorter than lookback_days ({})",
                self.holdout_days, self.lookback_days
            )));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ForecastError::invalid_config(format!(
                "smoothing_alpha must lie in (0, 1] (got {})",
                self.smoothing_alpha
            )));
        }
        if self.summary_cap == 0 {
            return Err(ForecastError::invalid_config("summary_cap must be positive"));
        }
        if self.subject_timeout_secs == Some(0) {
            return Err(ForecastError::invalid_config("subject_timeout_secs must be positive"));
        }
        self.cross_validation.validate()?;
        self.features.validate()?;
        self.decomposition.validate()
    }

    pub fn model(&self) -> ForecastModel {
        ForecastModel::new(self.min_sale_days, self.smoothing_alpha, self.decomposition.clone())
    }
}

fn override_with<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "unparsable setting; keeping default"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ForecastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lookback_days, 180);
        assert_eq!(config.min_sale_days, 60);
        assert!(!config.train_on_missing);
    }

    #[test]
    fn environment_overrides_apply() {
        let config = ForecastConfig::from_lookup(lookup(&[
            ("STOCKCAST_LOOKBACK_DAYS", "365"),
            ("STOCKCAST_CONFIDENCE_LEVEL", "0.8"),
            ("STOCKCAST_TRAIN_ON_MISSING", "true"),
            ("STOCKCAST_SUBJECT_TIMEOUT_SECS", "30"),
            ("STOCKCAST_SEASONALITY_MODE", "Additive"),
        ]));

        assert_eq!(config.lookback_days, 365);
        assert_eq!(config.confidence_level.value(), 0.8);
        assert!(config.train_on_missing);
        assert_eq!(config.subject_timeout_secs, Some(30));
        assert_eq!(config.decomposition.mode, SeasonalityMode::Additive);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = ForecastConfig::from_lookup(lookup(&[
            ("STOCKCAST_MIN_SALE_DAYS", "sixty"),
            ("STOCKCAST_CONFIDENCE_LEVEL", "1.5"),
        ]));
        assert_eq!(config.min_sale_days, 60);
        assert_eq!(config.confidence_level, ConfidenceLevel::DEFAULT);
    }

    #[test]
    fn json_fills_missing_fields_and_validates() {
        let config = ForecastConfig::from_json(r#"{"holdout_days": 14, "summary_cap": 5}"#).unwrap();
        assert_eq!(config.holdout_days, 14);
        assert_eq!(config.summary_cap, 5);
        assert_eq!(config.lookback_days, 180);

        let err = ForecastConfig::from_json(r#"{"holdout_days": 400}"#).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidConfig(_)));
    }
}
