//! Persisted forecast cache in the `demand_forecasts` table.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;

use stockcast_core::{CachedForecast, EngineResult, ForecastError, Subject};
use stockcast_forecast::ForecastCache;

use super::{PgRuntime, describe};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS demand_forecasts (
    subject       TEXT             NOT NULL,
    forecast_date DATE             NOT NULL,
    value         DOUBLE PRECISION NOT NULL CHECK (value >= 0),
    lower_bound   DOUBLE PRECISION NOT NULL CHECK (lower_bound >= 0),
    upper_bound   DOUBLE PRECISION NOT NULL CHECK (upper_bound >= 0),
    generated_at  TIMESTAMPTZ      NOT NULL,
    PRIMARY KEY (subject, forecast_date)
)
"#;

/// Rows are keyed by the subject's display form (`sku:<code>` / `category:<code>`).
pub struct PostgresForecastCache {
    db: PgRuntime,
}

impl PostgresForecastCache {
    pub fn new(db: PgRuntime) -> Self {
        Self { db }
    }

    /// Create the cache table if it does not exist.
    pub fn ensure_schema(&self) -> EngineResult<()> {
        self.db
            .block_on(sqlx::query(SCHEMA).execute(self.db.pool()))
            .map_err(cache_error("ensure_schema"))?;
        Ok(())
    }
}

fn cache_error(operation: &str) -> impl FnOnce(sqlx::Error) -> ForecastError + '_ {
    move |e| ForecastError::storage(describe(operation, &e))
}

fn decode(row: &PgRow) -> EngineResult<CachedForecast> {
    let field = |e: sqlx::Error| ForecastError::storage(describe("decode forecast row", &e));
    let subject: String = row.try_get("subject").map_err(field)?;
    Ok(CachedForecast {
        subject: subject.parse()?,
        forecast_date: row.try_get::<NaiveDate, _>("forecast_date").map_err(field)?,
        value: row.try_get("value").map_err(field)?,
        lower_bound: row.try_get("lower_bound").map_err(field)?,
        upper_bound: row.try_get("upper_bound").map_err(field)?,
        generated_at: row.try_get::<DateTime<Utc>, _>("generated_at").map_err(field)?,
    })
}

impl ForecastCache for PostgresForecastCache {
    fn upsert(&self, rows: &[CachedForecast]) -> EngineResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.db
            .block_on(async {
                let mut tx = self.db.pool().begin().await?;
                for row in rows {
                    sqlx::query(
                        r#"
                        INSERT INTO demand_forecasts
                            (subject, forecast_date, value, lower_bound, upper_bound, generated_at)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        ON CONFLICT (subject, forecast_date) DO UPDATE SET
                            value = EXCLUDED.value,
                            lower_bound = EXCLUDED.lower_bound,
                            upper_bound = EXCLUDED.upper_bound,
                            generated_at = EXCLUDED.generated_at
                        "#,
                    )
                    .bind(row.subject.to_string())
                    .bind(row.forecast_date)
                    .bind(row.value)
                    .bind(row.lower_bound)
                    .bind(row.upper_bound)
                    .bind(row.generated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await
            })
            .map_err(cache_error("upsert"))?;
        tracing::debug!(rows = rows.len(), "forecast cache upserted");
        Ok(())
    }

    fn get(&self, subject: &Subject, date: NaiveDate) -> EngineResult<Option<CachedForecast>> {
        let row = self
            .db
            .block_on(
                sqlx::query(
                    r#"
                    SELECT subject, forecast_date, value, lower_bound, upper_bound, generated_at
                    FROM demand_forecasts
                    WHERE subject = $1 AND forecast_date = $2
                    "#,
                )
                .bind(subject.to_string())
                .bind(date)
                .fetch_optional(self.db.pool()),
            )
            .map_err(cache_error("get"))?;
        row.as_ref().map(decode).transpose()
    }

    fn list(&self, subject: &Subject) -> EngineResult<Vec<CachedForecast>> {
        let rows = self
            .db
            .block_on(
                sqlx::query(
                    r#"
                    SELECT subject, forecast_date, value, lower_bound, upper_bound, generated_at
                    FROM demand_forecasts
                    WHERE subject = $1
                    ORDER BY forecast_date
                    "#,
                )
                .bind(subject.to_string())
                .fetch_all(self.db.pool()),
            )
            .map_err(cache_error("list"))?;
        rows.iter().map(decode).collect()
    }
}
