//! Gap-free daily demand series.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{EngineResult, ForecastError};

/// A single day of observed demand.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub quantity: f64,
}

/// Daily demand, one entry per calendar day with no gaps.
///
/// Stored as a start date plus a dense value vector, so contiguity holds by
/// construction. Quantities are never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ObservationSeries {
    start: Option<NaiveDate>,
    values: Vec<f64>,
}

impl ObservationSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from dense values starting at `start`. Negative or non-finite
    /// quantities are clamped to zero.
    pub fn from_values(start: NaiveDate, values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::empty();
        }
        let values = values
            .into_iter()
            .map(|q| if q.is_finite() { q.max(0.0) } else { 0.0 })
            .collect();
        Self {
            start: Some(start),
            values,
        }
    }

    /// Zero-filled series covering every day in `[start, end]`, summing the
    /// given per-day totals. Totals outside the range are ignored.
    pub fn zero_filled(
        start: NaiveDate,
        end: NaiveDate,
        totals: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> EngineResult<Self> {
        if end < start {
            return Err(ForecastError::validation(format!(
                "series end {end} precedes start {start}"
            )));
        }
        let len = (end - start).num_days() as usize + 1;
        let mut values = vec![0.0; len];
        for (date, quantity) in totals {
            if date < start || date > end {
                continue;
            }
            values[(date - start).num_days() as usize] += quantity;
        }
        Ok(Self::from_values(start, values))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.start
            .map(|s| s + Duration::days(self.values.len() as i64 - 1))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        match self.start {
            Some(s) if index < self.values.len() => Some(s + Duration::days(index as i64)),
            _ => None,
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        let start = self.start?;
        if date < start {
            return None;
        }
        self.values.get((date - start).num_days() as usize).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Observation> + '_ {
        self.values.iter().enumerate().filter_map(|(i, q)| {
            self.date_at(i).map(|date| Observation {
                date,
                quantity: *q,
            })
        })
    }

    /// Days with at least one recorded sale.
    pub fn sale_days(&self) -> u32 {
        self.values.iter().filter(|q| **q > 0.0).count() as u32
    }

    /// Average daily demand over the whole series (0 for an empty series).
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// The prefix strictly before `cutoff`.
    pub fn before(&self, cutoff: NaiveDate) -> Self {
        match self.start {
            Some(start) if cutoff > start => {
                let keep = ((cutoff - start).num_days() as usize).min(self.values.len());
                Self::from_values(start, self.values[..keep].to_vec())
            }
            _ => Self::empty(),
        }
    }

    /// Split into `[start, split)` and `[split, end]`.
    pub fn split_at_date(&self, split: NaiveDate) -> (Self, Self) {
        let head = self.before(split);
        let tail = match self.start {
            Some(start) if head.len() < self.values.len() => {
                let offset = head.len();
                Self::from_values(
                    start + Duration::days(offset as i64),
                    self.values[offset..].to_vec(),
                )
            }
            _ => Self::empty(),
        };
        (head, tail)
    }

    /// Week-ending-Saturday totals, keyed by the Saturday closing each week.
    pub fn to_weekly(&self) -> Vec<Observation> {
        let mut weeks: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for obs in self.iter() {
            let to_saturday = (Weekday::Sat.num_days_from_monday() + 7
                - obs.date.weekday().num_days_from_monday())
                % 7;
            let week_end = obs.date + Duration::days(to_saturday as i64);
            *weeks.entry(week_end).or_insert(0.0) += obs.quantity;
        }
        weeks
            .into_iter()
            .map(|(date, quantity)| Observation { date, quantity })
            .collect()
    }
}
