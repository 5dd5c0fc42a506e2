//! Calendar and promotion reference data.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineResult, ForecastError};
use crate::id::{Sku, Subject};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Holiday,
    Festival,
    Sale,
}

impl EventKind {
    /// Whether events of this kind shift demand the way public holidays do.
    pub fn is_holiday_effect(self) -> bool {
        matches!(self, EventKind::Holiday | EventKind::Festival)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub date: NaiveDate,
    pub name: String,
    pub kind: EventKind,
    /// `None` means nationwide.
    pub region: Option<String>,
}

impl CalendarEvent {
    pub fn new(date: NaiveDate, name: impl Into<String>, kind: EventKind) -> EngineResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ForecastError::validation("event name cannot be empty"));
        }
        Ok(Self {
            date,
            name,
            kind,
            region: None,
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// National holidays and festivals merged into every run when the source does
/// not already list an event on that date.
const DEFAULT_HOLIDAYS: &[(i32, u32, u32, &str)] = &[
    (2024, 1, 26, "Republic Day"),
    (2024, 3, 25, "Holi"),
    (2024, 8, 15, "Independence Day"),
    (2024, 10, 2, "Gandhi Jayanti"),
    (2024, 10, 24, "Diwali"),
    (2024, 11, 1, "Diwali Week"),
    (2025, 1, 26, "Republic Day"),
    (2025, 3, 14, "Holi"),
    (2025, 8, 15, "Independence Day"),
    (2025, 10, 2, "Gandhi Jayanti"),
    (2025, 10, 12, "Diwali"),
    (2025, 11, 1, "Diwali Week"),
    (2026, 1, 26, "Republic Day"),
    (2026, 3, 4, "Holi"),
    (2026, 8, 15, "Independence Day"),
    (2026, 10, 2, "Gandhi Jayanti"),
    (2026, 11, 8, "Diwali"),
    (2026, 11, 15, "Diwali Week"),
];

/// Holiday-effect events for one forecast run, deduplicated by date.
///
/// Only `holiday` and `festival` events are kept; `sale` events describe
/// promotions, which reach the model through [`PromotionWindow`]s instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarEvents {
    by_date: BTreeMap<NaiveDate, CalendarEvent>,
}

impl CalendarEvents {
    /// First event listed for a date wins.
    pub fn new(events: impl IntoIterator<Item = CalendarEvent>) -> Self {
        let mut by_date = BTreeMap::new();
        for event in events {
            if !event.kind.is_holiday_effect() {
                continue;
            }
            by_date.entry(event.date).or_insert(event);
        }
        Self { by_date }
    }

    pub fn with_default_holidays(mut self) -> Self {
        for (y, m, d, name) in DEFAULT_HOLIDAYS {
            let Some(date) = NaiveDate::from_ymd_opt(*y, *m, *d) else {
                continue;
            };
            self.by_date.entry(date).or_insert_with(|| CalendarEvent {
                date,
                name: (*name).to_string(),
                kind: EventKind::Holiday,
                region: None,
            });
        }
        self
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.by_date.contains_key(&date)
    }

    pub fn name_on(&self, date: NaiveDate) -> Option<&str> {
        self.by_date.get(&date).map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalendarEvent> {
        self.by_date.values()
    }
}

/// A promotion period, optionally restricted to one SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPromotionWindow")]
pub struct PromotionWindow {
    start: NaiveDate,
    end: NaiveDate,
    sku: Option<Sku>,
}

#[derive(Deserialize)]
struct RawPromotionWindow {
    start: NaiveDate,
    end: NaiveDate,
    #[serde(default)]
    sku: Option<Sku>,
}

impl TryFrom<RawPromotionWindow> for PromotionWindow {
    type Error = ForecastError;

    fn try_from(raw: RawPromotionWindow) -> EngineResult<Self> {
        Self::new(raw.start, raw.end, raw.sku)
    }
}

impl PromotionWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, sku: Option<Sku>) -> EngineResult<Self> {
        if end < start {
            return Err(ForecastError::validation(format!(
                "promotion ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end, sku })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn sku(&self) -> Option<&Sku> {
        self.sku.as_ref()
    }

    /// Unscoped promotions apply to every subject; scoped ones only to their SKU.
    pub fn applies_to(&self, subject: &Subject) -> bool {
        match (&self.sku, subject) {
            (None, _) => true,
            (Some(scoped), Subject::Sku(sku)) => scoped == sku,
            (Some(_), Subject::Category(_)) => false,
        }
    }

    /// Inclusive on both ends.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
