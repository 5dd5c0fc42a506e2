//! Boundary to the sales/reference-data persistence layer.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockcast_core::{
    CalendarEvent, Category, EngineResult, ForecastError, PromotionWindow, Sku, Subject,
};

/// Per-day sales total for a subject.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub date: NaiveDate,
    pub quantity: f64,
}

/// Read-only access to historical sales and reference data.
///
/// Category subjects aggregate every SKU whose category matches. Implementations
/// return `DataAccess` when the backing store is unreachable; an empty vector
/// is not an error.
pub trait SalesSource: Send + Sync {
    /// Sales totals within `[start, end]`; several records per date are allowed.
    fn sale_records(
        &self,
        subject: &Subject,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<SaleRecord>>;

    fn calendar_events(&self) -> EngineResult<Vec<CalendarEvent>>;

    /// Promotions overlapping `[start, end]` that apply to the subject.
    fn promotions(
        &self,
        subject: &Subject,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<PromotionWindow>>;

    /// Distinct days with at least one recorded sale, over all time.
    fn count_sale_days(&self, subject: &Subject) -> EngineResult<u32>;

    fn category_of(&self, sku: &Sku) -> EngineResult<Option<Category>>;

    /// Active SKUs, optionally restricted to one category, sorted by code.
    fn active_skus(&self, category: Option<&Category>) -> EngineResult<Vec<Sku>>;
}

#[derive(Debug, Clone)]
struct ProductEntry {
    category: Category,
    active: bool,
}

#[derive(Debug, Default)]
struct SourceState {
    products: HashMap<Sku, ProductEntry>,
    sales: HashMap<Sku, Vec<SaleRecord>>,
    events: Vec<CalendarEvent>,
    promotions: Vec<PromotionWindow>,
    unavailable: bool,
}

/// In-memory sales source for tests and local development.
#[derive(Debug, Default)]
pub struct InMemorySalesSource {
    state: RwLock<SourceState>,
}

impl InMemorySalesSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, sku: Sku, category: Category) -> EngineResult<()> {
        let mut state = self.write()?;
        state.products.insert(sku, ProductEntry { category, active: true });
        Ok(())
    }

    pub fn deactivate(&self, sku: &Sku) -> EngineResult<()> {
        let mut state = self.write()?;
        if let Some(entry) = state.products.get_mut(sku) {
            entry.active = false;
        }
        Ok(())
    }

    pub fn record_sale(&self, sku: &Sku, date: NaiveDate, quantity: f64) -> EngineResult<()> {
        let mut state = self.write()?;
        state
            .sales
            .entry(sku.clone())
            .or_default()
            .push(SaleRecord { date, quantity });
        Ok(())
    }

    /// Record `values[i]` on `start + i` days, skipping zeros.
    pub fn record_daily(&self, sku: &Sku, start: NaiveDate, values: &[f64]) -> EngineResult<()> {
        for (i, q) in values.iter().enumerate() {
            if *q > 0.0 {
                self.record_sale(sku, start + chrono::Duration::days(i as i64), *q)?;
            }
        }
        Ok(())
    }

    pub fn add_event(&self, event: CalendarEvent) -> EngineResult<()> {
        self.write()?.events.push(event);
        Ok(())
    }

    pub fn add_promotion(&self, promotion: PromotionWindow) -> EngineResult<()> {
        self.write()?.promotions.push(promotion);
        Ok(())
    }

    /// Simulate an unreachable backing store.
    pub fn set_unavailable(&self, unavailable: bool) -> EngineResult<()> {
        self.write()?.unavailable = unavailable;
        Ok(())
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, SourceState>> {
        self.state
            .write()
            .map_err(|_| ForecastError::data_access("sales source lock poisoned"))
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, SourceState>> {
        let state = self
            .state
            .read()
            .map_err(|_| ForecastError::data_access("sales source lock poisoned"))?;
        if state.unavailable {
            return Err(ForecastError::data_access("sales source unavailable"));
        }
        Ok(state)
    }
}

impl SourceState {
    fn skus_for<'a>(&'a self, subject: &'a Subject) -> Box<dyn Iterator<Item = &'a Sku> + 'a> {
        match subject {
            Subject::Sku(sku) => Box::new(std::iter::once(sku)),
            Subject::Category(category) => Box::new(
                self.products
                    .iter()
                    .filter(move |(_, p)| &p.category == category)
                    .map(|(sku, _)| sku),
            ),
        }
    }
}

impl SalesSource for InMemorySalesSource {
    fn sale_records(
        &self,
        subject: &Subject,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<SaleRecord>> {
        let state = self.read()?;
        let mut out: Vec<SaleRecord> = state
            .skus_for(subject)
            .filter_map(|sku| state.sales.get(sku))
            .flatten()
            .filter(|r| r.date >= start && r.date <= end)
            .copied()
            .collect();
        out.sort_by_key(|r| r.date);
        Ok(out)
    }

    fn calendar_events(&self) -> EngineResult<Vec<CalendarEvent>> {
        Ok(self.read()?.events.clone())
    }

    fn promotions(
        &self,
        subject: &Subject,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<PromotionWindow>> {
        let state = self.read()?;
        Ok(state
            .promotions
            .iter()
            .filter(|p| p.applies_to(subject) && p.start() <= end && p.end() >= start)
            .cloned()
            .collect())
    }

    fn count_sale_days(&self, subject: &Subject) -> EngineResult<u32> {
        let state = self.read()?;
        let days: BTreeSet<NaiveDate> = state
            .skus_for(subject)
            .filter_map(|sku| state.sales.get(sku))
            .flatten()
            .filter(|r| r.quantity > 0.0)
            .map(|r| r.date)
            .collect();
        Ok(days.len() as u32)
    }

    fn category_of(&self, sku: &Sku) -> EngineResult<Option<Category>> {
        Ok(self.read()?.products.get(sku).map(|p| p.category.clone()))
    }

    fn active_skus(&self, category: Option<&Category>) -> EngineResult<Vec<Sku>> {
        let state = self.read()?;
        let mut skus: Vec<Sku> = state
            .products
            .iter()
            .filter(|(_, p)| p.active && category.is_none_or(|c| &p.category == c))
            .map(|(sku, _)| sku.clone())
            .collect();
        skus.sort();
        Ok(skus)
    }
}
