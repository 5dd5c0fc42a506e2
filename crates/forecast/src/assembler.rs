//! Gap-filled daily series from raw sales records.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use stockcast_core::{EngineResult, ObservationSeries, Subject};

use crate::source::SalesSource;

/// Builds zero-filled [`ObservationSeries`] from a [`SalesSource`].
pub struct TimeSeriesAssembler<S> {
    source: Arc<S>,
}

impl<S> Clone for TimeSeriesAssembler<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: SalesSource> TimeSeriesAssembler<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Every calendar day in `[start, end]`, summing recorded quantity per day.
    ///
    /// Returns an empty series (not an error) when the subject has no sales in
    /// range; callers must handle that case.
    pub fn fetch_daily_quantities(
        &self,
        subject: &Subject,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<ObservationSeries> {
        let records = self.source.sale_records(subject, start, end)?;
        if records.is_empty() {
            debug!(subject = %subject, %start, %end, "no sales recorded in range");
            return Ok(ObservationSeries::empty());
        }
        let series =
            ObservationSeries::zero_filled(start, end, records.into_iter().map(|r| (r.date, r.quantity)))?;
        debug!(
            subject = %subject,
            days = series.len(),
            sale_days = series.sale_days(),
            "assembled daily series"
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySalesSource;
    use stockcast_core::{Category, ForecastError, Sku};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn fills_every_day_in_range() {
        let source = Arc::new(InMemorySalesSource::new());
        let sku = Sku::new("SAR-001").unwrap();
        source.add_product(sku.clone(), Category::new("sarees").unwrap()).unwrap();
        source.record_sale(&sku, d(2026, 2, 2), 3.0).unwrap();
        source.record_sale(&sku, d(2026, 2, 2), 1.0).unwrap();

        let assembler = TimeSeriesAssembler::new(source);
        let series = assembler
            .fetch_daily_quantities(&Subject::Sku(sku), d(2026, 2, 1), d(2026, 2, 4))
            .unwrap();

        assert_eq!(series.values(), &[0.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn no_sales_yields_empty_series() {
        let assembler = TimeSeriesAssembler::new(Arc::new(InMemorySalesSource::new()));
        let series = assembler
            .fetch_daily_quantities(&Subject::sku("NONE").unwrap(), d(2026, 2, 1), d(2026, 2, 4))
            .unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn holders_need_not_repeat_the_source_bound() {
        struct Holder<S> {
            assembler: TimeSeriesAssembler<S>,
        }

        let holder = Holder {
            assembler: TimeSeriesAssembler::new(Arc::new(InMemorySalesSource::new())),
        };
        let copy = holder.assembler.clone();
        let series = copy
            .fetch_daily_quantities(&Subject::sku("NONE").unwrap(), d(2026, 2, 1), d(2026, 2, 4))
            .unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn unreachable_source_propagates() {
        let source = Arc::new(InMemorySalesSource::new());
        source.set_unavailable(true).unwrap();
        let err = TimeSeriesAssembler::new(source)
            .fetch_daily_quantities(&Subject::sku("X").unwrap(), d(2026, 2, 1), d(2026, 2, 4))
            .unwrap_err();
        assert!(matches!(err, ForecastError::DataAccess(_)));
    }
}
