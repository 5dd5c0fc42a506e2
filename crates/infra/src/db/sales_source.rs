//! Sales history, calendar and product reference data from Postgres.
//!
//! Tables read: `sales (timestamp, sku, quantity)`,
//! `products (sku, category, active)`, `calendar_events (date, name, type, region)`
//! and `promotions (start_date, end_date, active[, sku])`.
//!
//! The `promotions.sku` column is optional. Where present, a `NULL` sku marks a
//! store-wide promotion; tables without the column (the plain promotions
//! schema) are read as store-wide only.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, NaiveDate};
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::{debug, warn};

use stockcast_core::{
    CalendarEvent, Category, EngineResult, EventKind, ForecastError, PromotionWindow, Sku, Subject,
};
use stockcast_forecast::{SaleRecord, SalesSource};

use super::{PgRuntime, describe};

pub struct PostgresSalesSource {
    db: PgRuntime,
    /// Cleared once the promotions table turns out to lack a `sku` column.
    scoped_promotions: AtomicBool,
}

impl PostgresSalesSource {
    pub fn new(db: PgRuntime) -> Self {
        Self {
            db,
            scoped_promotions: AtomicBool::new(true),
        }
    }
}

const SCOPED_PROMOTIONS: &str = r#"
    SELECT start_date, end_date, sku
    FROM promotions
    WHERE active
      AND (sku IS NULL OR sku = $1)
      AND start_date <= $3
      AND end_date >= $2
    ORDER BY start_date
"#;

const STORE_WIDE_PROMOTIONS: &str = r#"
    SELECT start_date, end_date, NULL::text AS sku
    FROM promotions
    WHERE active
      AND start_date <= $2
      AND end_date >= $1
    ORDER BY start_date
"#;

/// SQLSTATE `undefined_column`.
const UNDEFINED_COLUMN: &str = "42703";

fn is_undefined_column(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNDEFINED_COLUMN)
}

fn source_error(operation: &str) -> impl FnOnce(sqlx::Error) -> ForecastError + '_ {
    move |e| ForecastError::data_access(describe(operation, &e))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> EngineResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| ForecastError::data_access(describe(&format!("decode {name}"), &e)))
}

fn event_kind(raw: &str) -> Option<EventKind> {
    match raw.to_ascii_lowercase().as_str() {
        "holiday" => Some(EventKind::Holiday),
        "festival" => Some(EventKind::Festival),
        "sale" => Some(EventKind::Sale),
        _ => None,
    }
}

impl SalesSource for PostgresSalesSource {
    fn sale_records(&self, subject: &Subject, start: NaiveDate, end: NaiveDate) -> EngineResult<Vec<SaleRecord>> {
        // Half-open upper bound so the whole `end` day is included.
        let until = end + Duration::days(1);
        let rows = self
            .db
            .block_on(async {
                match subject {
                    Subject::Sku(sku) => {
                        sqlx::query(
                            r#"
                            SELECT DATE("timestamp") AS day, SUM(quantity)::float8 AS quantity
                            FROM sales
                            WHERE sku = $1 AND "timestamp" >= $2 AND "timestamp" < $3
                            GROUP BY DATE("timestamp")
                            ORDER BY day
                            "#,
                        )
                        .bind(sku.as_str())
                        .bind(start)
                        .bind(until)
                        .fetch_all(self.db.pool())
                        .await
                    }
                    Subject::Category(category) => {
                        sqlx::query(
                            r#"
                            SELECT DATE(s."timestamp") AS day, SUM(s.quantity)::float8 AS quantity
                            FROM sales s
                            JOIN products p ON s.sku = p.sku
                            WHERE p.category = $1 AND s."timestamp" >= $2 AND s."timestamp" < $3
                            GROUP BY DATE(s."timestamp")
                            ORDER BY day
                            "#,
                        )
                        .bind(category.as_str())
                        .bind(start)
                        .bind(until)
                        .fetch_all(self.db.pool())
                        .await
                    }
                }
            })
            .map_err(source_error("sale_records"))?;

        let records = rows
            .iter()
            .map(|row| {
                Ok(SaleRecord {
                    date: column(row, "day")?,
                    quantity: column(row, "quantity")?,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        debug!(subject = %subject, days = records.len(), "loaded sales");
        Ok(records)
    }

    fn calendar_events(&self) -> EngineResult<Vec<CalendarEvent>> {
        let rows = self
            .db
            .block_on(
                sqlx::query(r#"SELECT date, name, "type"::text AS kind, region FROM calendar_events ORDER BY date"#)
                    .fetch_all(self.db.pool()),
            )
            .map_err(source_error("calendar_events"))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let date: NaiveDate = column(row, "date")?;
            let name: String = column(row, "name")?;
            let kind: String = column(row, "kind")?;
            let region: Option<String> = column(row, "region")?;

            let Some(kind) = event_kind(&kind) else {
                warn!(%date, %name, %kind, "skipping calendar event of unknown type");
                continue;
            };
            match CalendarEvent::new(date, name, kind) {
                Ok(event) => events.push(match region {
                    Some(region) => event.with_region(region),
                    None => event,
                }),
                Err(e) => warn!(%date, error = %e, "skipping invalid calendar event"),
            }
        }
        Ok(events)
    }

    fn promotions(&self, subject: &Subject, start: NaiveDate, end: NaiveDate) -> EngineResult<Vec<PromotionWindow>> {
        let store_wide = || {
            self.db.block_on(
                sqlx::query(STORE_WIDE_PROMOTIONS)
                    .bind(start)
                    .bind(end)
                    .fetch_all(self.db.pool()),
            )
        };
        let fetched = if self.scoped_promotions.load(Ordering::Relaxed) {
            let sku = subject.as_sku().map(|s| s.as_str().to_string());
            let scoped = self.db.block_on(
                sqlx::query(SCOPED_PROMOTIONS)
                    .bind(sku)
                    .bind(start)
                    .bind(end)
                    .fetch_all(self.db.pool()),
            );
            match scoped {
                Err(e) if is_undefined_column(&e) => {
                    warn!("promotions table has no sku column; treating every promotion as store-wide");
                    self.scoped_promotions.store(false, Ordering::Relaxed);
                    store_wide()
                }
                other => other,
            }
        } else {
            store_wide()
        };
        let rows = fetched.map_err(source_error("promotions"))?;

        let mut windows = Vec::with_capacity(rows.len());
        for row in &rows {
            let scoped: Option<String> = column(row, "sku")?;
            let scoped = scoped.map(Sku::new).transpose()?;
            match PromotionWindow::new(column(row, "start_date")?, column(row, "end_date")?, scoped) {
                Ok(window) => windows.push(window),
                Err(e) => warn!(subject = %subject, error = %e, "skipping invalid promotion"),
            }
        }
        Ok(windows)
    }

    fn count_sale_days(&self, subject: &Subject) -> EngineResult<u32> {
        let count: i64 = self
            .db
            .block_on(async {
                match subject {
                    Subject::Sku(sku) => {
                        sqlx::query_scalar::<_, i64>(
                            r#"SELECT COUNT(DISTINCT DATE("timestamp")) FROM sales WHERE sku = $1"#,
                        )
                        .bind(sku.as_str())
                        .fetch_one(self.db.pool())
                        .await
                    }
                    Subject::Category(category) => {
                        sqlx::query_scalar::<_, i64>(
                            r#"
                            SELECT COUNT(DISTINCT DATE(s."timestamp"))
                            FROM sales s
                            JOIN products p ON s.sku = p.sku
                            WHERE p.category = $1
                            "#,
                        )
                        .bind(category.as_str())
                        .fetch_one(self.db.pool())
                        .await
                    }
                }
            })
            .map_err(source_error("count_sale_days"))?;
        Ok(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
    }

    fn category_of(&self, sku: &Sku) -> EngineResult<Option<Category>> {
        let category: Option<String> = self
            .db
            .block_on(
                sqlx::query_scalar::<_, String>("SELECT category FROM products WHERE sku = $1")
                    .bind(sku.as_str())
                    .fetch_optional(self.db.pool()),
            )
            .map_err(source_error("category_of"))?;
        category.map(Category::new).transpose()
    }

    fn active_skus(&self, category: Option<&Category>) -> EngineResult<Vec<Sku>> {
        let codes: Vec<String> = self
            .db
            .block_on(
                sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT sku FROM products
                    WHERE active AND ($1::text IS NULL OR category = $1)
                    ORDER BY sku
                    "#,
                )
                .bind(category.map(|c| c.as_str().to_string()))
                .fetch_all(self.db.pool()),
            )
            .map_err(source_error("active_skus"))?;
        codes.into_iter().map(Sku::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_parse_case_insensitively() {
        assert_eq!(event_kind("HOLIDAY"), Some(EventKind::Holiday));
        assert_eq!(event_kind("festival"), Some(EventKind::Festival));
        assert_eq!(event_kind("Sale"), Some(EventKind::Sale));
        assert_eq!(event_kind("birthday"), None);
    }

    #[test]
    fn store_wide_promotions_never_filter_on_sku() {
        assert!(SCOPED_PROMOTIONS.contains("sku = $1"));
        assert!(!STORE_WIDE_PROMOTIONS.contains("sku ="));
        assert!(STORE_WIDE_PROMOTIONS.contains("NULL::text AS sku"));
    }

    #[test]
    fn only_database_column_errors_switch_promotion_queries() {
        assert!(!is_undefined_column(&sqlx::Error::RowNotFound));
        assert!(!is_undefined_column(&sqlx::Error::PoolTimedOut));
    }
}
