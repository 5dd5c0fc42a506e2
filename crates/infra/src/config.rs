//! Deployment configuration for adapters and the refresh runner.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use stockcast_core::{EngineResult, ForecastError, MAX_HORIZON_DAYS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraConfig {
    /// Required by the worker binary.
    pub database_url: Option<String>,
    pub model_dir: PathBuf,
    /// How often the refresh runner looks for a new run day.
    pub refresh_check_interval: Duration,
    pub refresh_horizon_days: u32,
    /// Same-day retries of subjects that failed transiently.
    pub refresh_max_retries: u32,
    pub workers: usize,
    pub max_connections: u32,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            model_dir: PathBuf::from("models"),
            refresh_check_interval: Duration::from_secs(15 * 60),
            refresh_horizon_days: 30,
            refresh_max_retries: 3,
            workers: 4,
            max_connections: 8,
        }
    }
}

impl InfraConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by the values `lookup` returns.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if config.database_url.is_none() {
            tracing::warn!("DATABASE_URL not set");
        }
        if let Some(dir) = lookup("STOCKCAST_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parsed::<u64>(&lookup, "STOCKCAST_REFRESH_CHECK_SECS") {
            config.refresh_check_interval = Duration::from_secs(secs);
        }
        if let Some(retries) = parsed(&lookup, "STOCKCAST_REFRESH_MAX_RETRIES") {
            config.refresh_max_retries = retries;
        }
        if let Some(days) = parsed(&lookup, "STOCKCAST_REFRESH_HORIZON_DAYS") {
            config.refresh_horizon_days = days;
        }
        if let Some(workers) = parsed(&lookup, "STOCKCAST_WORKERS") {
            config.workers = workers;
        }
        if let Some(max) = parsed(&lookup, "STOCKCAST_DB_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        config
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.refresh_check_interval.is_zero() {
            return Err(ForecastError::invalid_config("refresh check interval must be positive"));
        }
        if self.refresh_horizon_days == 0 || self.refresh_horizon_days > MAX_HORIZON_DAYS {
            return Err(ForecastError::invalid_config(format!(
                "refresh horizon must be between 1 and {MAX_HORIZON_DAYS} days"
            )));
        }
        if self.workers == 0 {
            return Err(ForecastError::invalid_config("workers must be positive"));
        }
        if self.max_connections == 0 {
            return Err(ForecastError::invalid_config("max_connections must be positive"));
        }
        Ok(())
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "unparsable setting; keeping default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn overrides_apply_and_garbage_keeps_defaults() {
        let config = InfraConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/stockcast"),
            ("STOCKCAST_MODEL_DIR", "/var/lib/stockcast"),
            ("STOCKCAST_REFRESH_CHECK_SECS", "600"),
            ("STOCKCAST_REFRESH_MAX_RETRIES", "5"),
            ("STOCKCAST_WORKERS", "many"),
        ]));

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/stockcast"));
        assert_eq!(config.model_dir, PathBuf::from("/var/lib/stockcast"));
        assert_eq!(config.refresh_check_interval, Duration::from_secs(600));
        assert_eq!(config.refresh_max_retries, 5);
        assert_eq!(config.workers, InfraConfig::default().workers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_database_url_is_unset() {
        let config = InfraConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")]));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn out_of_range_horizon_is_rejected() {
        let config = InfraConfig::from_lookup(lookup(&[("STOCKCAST_REFRESH_HORIZON_DAYS", "400")]));
        assert!(matches!(config.validate(), Err(ForecastError::InvalidConfig(_))));
    }
}
