//! Persisted forecast cache seam.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::NaiveDate;

use stockcast_core::{CachedForecast, EngineResult, ForecastError, Subject};

/// Logical table keyed by `(subject, forecast_date)`.
///
/// Writes are upserts: a newer generation for the same key overwrites value,
/// bounds and `generated_at`.
pub trait ForecastCache: Send + Sync {
    fn upsert(&self, rows: &[CachedForecast]) -> EngineResult<()>;
    fn get(&self, subject: &Subject, date: NaiveDate) -> EngineResult<Option<CachedForecast>>;
    /// Rows for a subject, ascending by date.
    fn list(&self, subject: &Subject) -> EngineResult<Vec<CachedForecast>>;
}

#[derive(Debug, Default)]
pub struct InMemoryForecastCache {
    rows: RwLock<BTreeMap<(Subject, NaiveDate), CachedForecast>>,
}

impl InMemoryForecastCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ForecastCache for InMemoryForecastCache {
    fn upsert(&self, rows: &[CachedForecast]) -> EngineResult<()> {
        let mut table = self
            .rows
            .write()
            .map_err(|_| ForecastError::storage("forecast cache lock poisoned"))?;
        for row in rows {
            table.insert((row.subject.clone(), row.forecast_date), row.clone());
        }
        Ok(())
    }

    fn get(&self, subject: &Subject, date: NaiveDate) -> EngineResult<Option<CachedForecast>> {
        let table = self
            .rows
            .read()
            .map_err(|_| ForecastError::storage("forecast cache lock poisoned"))?;
        Ok(table.get(&(subject.clone(), date)).cloned())
    }

    fn list(&self, subject: &Subject) -> EngineResult<Vec<CachedForecast>> {
        let table = self
            .rows
            .read()
            .map_err(|_| ForecastError::storage("forecast cache lock poisoned"))?;
        Ok(table
            .iter()
            .filter(|((s, _), _)| s == subject)
            .map(|(_, row)| row.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use stockcast_core::ForecastPoint;

    #[test]
    fn upsert_is_last_write_wins() {
        let cache = InMemoryForecastCache::new();
        let subject = Subject::sku("SAR-001").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let first = ForecastPoint::from_raw(date, 10.0, 8.0, 12.0);
        let second = ForecastPoint::from_raw(date, 11.5, 9.25, 13.75);
        let t0 = Utc::now();

        cache.upsert(&[CachedForecast::from_point(&subject, &first, t0)]).unwrap();
        cache
            .upsert(&[CachedForecast::from_point(&subject, &second, t0 + Duration::minutes(5))])
            .unwrap();

        let row = cache.get(&subject, date).unwrap().unwrap();
        assert_eq!((row.value, row.lower_bound, row.upper_bound), (11.5, 9.25, 13.75));
        assert_eq!(row.generated_at, t0 + Duration::minutes(5));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn list_is_scoped_and_ordered() {
        let cache = InMemoryForecastCache::new();
        let a = Subject::sku("A").unwrap();
        let b = Subject::category("sarees").unwrap();
        let now = Utc::now();
        let day = |n: u32| NaiveDate::from_ymd_opt(2026, 5, n).unwrap();

        cache
            .upsert(&[
                CachedForecast::from_point(&a, &ForecastPoint::from_raw(day(3), 1.0, 0.0, 2.0), now),
                CachedForecast::from_point(&b, &ForecastPoint::from_raw(day(1), 5.0, 4.0, 6.0), now),
                CachedForecast::from_point(&a, &ForecastPoint::from_raw(day(2), 1.0, 0.0, 2.0), now),
            ])
            .unwrap();

        let rows = cache.list(&a).unwrap();
        assert_eq!(rows.iter().map(|r| r.forecast_date).collect::<Vec<_>>(), vec![day(2), day(3)]);
    }
}
