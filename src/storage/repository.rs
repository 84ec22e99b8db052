use chrono::Utc;
use sqlx::{Pool, Sqlite};
#[cfg(feature = "postgres")]
use sqlx::Postgres;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::domain::{
    Bulletin, CategoryEntry, Forecast, ForecastKey, RepositoryStats, Result, SeriesKey,
    SeriesPoint,
};
use super::models::{BulletinRow, CategoryEntryRow, ForecastRow, SeriesRow};

/// Backend-agnostic persistence contract for bulletins and derived artifacts.
///
/// Implementations must make `upsert_bulletin` atomic (bulletin and children
/// visible together or not at all) and idempotent: re-running a completed
/// ingestion changes nothing observable except `updated_at`.
#[async_trait::async_trait]
pub trait BulletinRepository: Send + Sync {
    /// Atomically upsert a bulletin and replace its child entries wholesale.
    /// `raw_html` is the gzip-compressed source document, when retained.
    async fn upsert_bulletin(
        &self,
        bulletin: &Bulletin,
        entries: &[CategoryEntry],
        raw_html: Option<&[u8]>,
    ) -> Result<i64>;

    async fn get_bulletin(&self, year: i32, month: u32) -> Result<Option<Bulletin>>;

    /// Bulletins in `[fy_from, fy_to]`, ordered by `(year, month)`.
    async fn list_bulletins(&self, fy_from: i32, fy_to: i32) -> Result<Vec<Bulletin>>;

    /// Entries of one bulletin, if it exists.
    async fn get_entries(&self, year: i32, month: u32) -> Result<Vec<CategoryEntry>>;

    /// `(year, month)` pairs already stored in the range; used for resume.
    async fn existing_months(&self, fy_from: i32, fy_to: i32) -> Result<HashSet<(i32, u32)>>;

    /// Observations for one series, ascending by bulletin date.
    async fn get_series(
        &self,
        key: &SeriesKey,
        fy_from: i32,
        fy_to: i32,
    ) -> Result<Vec<SeriesPoint>>;

    async fn get_stats(&self) -> Result<RepositoryStats>;

    async fn put_forecast(&self, forecast: &Forecast) -> Result<()>;
    async fn get_forecast(&self, key: &ForecastKey) -> Result<Option<Forecast>>;

    /// Retained raw document for a stored bulletin, gzip-compressed.
    async fn get_raw_html(&self, year: i32, month: u32) -> Result<Option<Vec<u8>>>;

    /// Months that retain a raw document, ordered by `(year, month)`.
    async fn months_with_raw_html(&self) -> Result<Vec<(i32, u32)>>;
}

// SQLite implementation (embedded backend)

#[derive(Clone)]
pub struct SqliteRepository {
    pool: Pool<Sqlite>,
}

impl SqliteRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait::async_trait]
impl BulletinRepository for SqliteRepository {
    async fn upsert_bulletin(
        &self,
        bulletin: &Bulletin,
        entries: &[CategoryEntry],
        raw_html: Option<&[u8]>,
    ) -> Result<i64> {
        info!(
            "Upserting bulletin {}-{:02} with {} entries",
            bulletin.year,
            bulletin.month,
            entries.len()
        );

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO bulletins (
                year, month, fiscal_year, bulletin_date, source_url, raw_html,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (year, month) DO UPDATE SET
                fiscal_year = excluded.fiscal_year,
                bulletin_date = excluded.bulletin_date,
                source_url = excluded.source_url,
                raw_html = COALESCE(excluded.raw_html, bulletins.raw_html),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(bulletin.year)
        .bind(bulletin.month as i32)
        .bind(bulletin.fiscal_year)
        .bind(bulletin.bulletin_date)
        .bind(&bulletin.source_url)
        .bind(raw_html)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id: i64 =
            sqlx::query_scalar("SELECT id FROM bulletins WHERE year = ? AND month = ?")
                .bind(bulletin.year)
                .bind(bulletin.month as i32)
                .fetch_one(&mut *tx)
                .await?;

        // Children are replaced wholesale.
        sqlx::query("DELETE FROM category_entries WHERE bulletin_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO category_entries (
                    bulletin_id, category, country, chart, status, priority_date, notes
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(entry.category.as_str())
            .bind(entry.country.as_str())
            .bind(entry.chart.as_str())
            .bind(entry.status.as_str())
            .bind(entry.priority_date)
            .bind(&entry.notes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Committed bulletin id={}", id);
        Ok(id)
    }

    async fn get_bulletin(&self, year: i32, month: u32) -> Result<Option<Bulletin>> {
        let row = sqlx::query_as::<_, BulletinRow>(
            r#"
            SELECT id, year, month, fiscal_year, bulletin_date, source_url,
                   created_at, updated_at
            FROM bulletins WHERE year = ? AND month = ?
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(BulletinRow::into_bulletin))
    }

    async fn list_bulletins(&self, fy_from: i32, fy_to: i32) -> Result<Vec<Bulletin>> {
        let rows = sqlx::query_as::<_, BulletinRow>(
            r#"
            SELECT id, year, month, fiscal_year, bulletin_date, source_url,
                   created_at, updated_at
            FROM bulletins
            WHERE fiscal_year >= ? AND fiscal_year <= ?
            ORDER BY year, month
            "#,
        )
        .bind(fy_from)
        .bind(fy_to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(BulletinRow::into_bulletin).collect())
    }

    async fn get_entries(&self, year: i32, month: u32) -> Result<Vec<CategoryEntry>> {
        let rows = sqlx::query_as::<_, CategoryEntryRow>(
            r#"
            SELECT e.id, e.bulletin_id, e.category, e.country, e.chart, e.status,
                   e.priority_date, e.notes
            FROM category_entries e
            JOIN bulletins b ON e.bulletin_id = b.id
            WHERE b.year = ? AND b.month = ?
            ORDER BY e.chart, e.category, e.country
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CategoryEntryRow::into_entry).collect()
    }

    async fn existing_months(&self, fy_from: i32, fy_to: i32) -> Result<HashSet<(i32, u32)>> {
        let rows: Vec<(i32, i32)> = sqlx::query_as(
            "SELECT year, month FROM bulletins WHERE fiscal_year >= ? AND fiscal_year <= ?",
        )
        .bind(fy_from)
        .bind(fy_to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(y, m)| (y, m as u32)).collect())
    }

    async fn get_series(
        &self,
        key: &SeriesKey,
        fy_from: i32,
        fy_to: i32,
    ) -> Result<Vec<SeriesPoint>> {
        let rows = sqlx::query_as::<_, SeriesRow>(
            r#"
            SELECT b.bulletin_date, e.status, e.priority_date
            FROM category_entries e
            JOIN bulletins b ON e.bulletin_id = b.id
            WHERE e.category = ? AND e.country = ? AND e.chart = ?
              AND b.fiscal_year >= ? AND b.fiscal_year <= ?
            ORDER BY b.year, b.month
            "#,
        )
        .bind(key.category.as_str())
        .bind(key.country.as_str())
        .bind(key.chart.as_str())
        .bind(fy_from)
        .bind(fy_to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SeriesRow::into_point).collect()
    }

    async fn get_stats(&self) -> Result<RepositoryStats> {
        let bulletin_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bulletins")
            .fetch_one(&self.pool)
            .await?;
        let entry_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM category_entries")
            .fetch_one(&self.pool)
            .await?;
        let (earliest, latest): (Option<chrono::NaiveDate>, Option<chrono::NaiveDate>) =
            sqlx::query_as("SELECT MIN(bulletin_date), MAX(bulletin_date) FROM bulletins")
                .fetch_one(&self.pool)
                .await?;
        let last_ingest_at: Option<chrono::DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(updated_at) FROM bulletins")
                .fetch_one(&self.pool)
                .await?;

        Ok(RepositoryStats {
            bulletin_count,
            entry_count,
            earliest,
            latest,
            last_ingest_at,
        })
    }

    async fn put_forecast(&self, forecast: &Forecast) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO forecasts (
                category, country, chart, target_year, target_month,
                predicted_date, confidence, model_id, produced_at, features_hash
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (category, country, chart, target_year, target_month)
            DO UPDATE SET
                predicted_date = excluded.predicted_date,
                confidence = excluded.confidence,
                model_id = excluded.model_id,
                produced_at = excluded.produced_at,
                features_hash = excluded.features_hash
            "#,
        )
        .bind(forecast.key.category.as_str())
        .bind(forecast.key.country.as_str())
        .bind(forecast.key.chart.as_str())
        .bind(forecast.key.target_year)
        .bind(forecast.key.target_month as i32)
        .bind(forecast.predicted_date)
        .bind(forecast.confidence)
        .bind(&forecast.model_id)
        .bind(forecast.produced_at)
        .bind(&forecast.features_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_forecast(&self, key: &ForecastKey) -> Result<Option<Forecast>> {
        let row = sqlx::query_as::<_, ForecastRow>(
            r#"
            SELECT category, country, chart, target_year, target_month,
                   predicted_date, confidence, model_id, produced_at, features_hash
            FROM forecasts
            WHERE category = ? AND country = ? AND chart = ?
              AND target_year = ? AND target_month = ?
            "#,
        )
        .bind(key.category.as_str())
        .bind(key.country.as_str())
        .bind(key.chart.as_str())
        .bind(key.target_year)
        .bind(key.target_month as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ForecastRow::into_forecast).transpose()
    }

    async fn get_raw_html(&self, year: i32, month: u32) -> Result<Option<Vec<u8>>> {
        let row: Option<(Option<Vec<u8>>,)> =
            sqlx::query_as("SELECT raw_html FROM bulletins WHERE year = ? AND month = ?")
                .bind(year)
                .bind(month as i32)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(blob,)| blob))
    }

    async fn months_with_raw_html(&self) -> Result<Vec<(i32, u32)>> {
        let rows: Vec<(i32, i32)> = sqlx::query_as(
            "SELECT year, month FROM bulletins WHERE raw_html IS NOT NULL ORDER BY year, month",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(y, m)| (y, m as u32)).collect())
    }
}

// ============================================================================
// PostgreSQL implementation (server backend)
// ============================================================================

#[cfg(feature = "postgres")]
#[derive(Clone)]
pub struct PostgresRepository {
    pool: Pool<Postgres>,
}

#[cfg(feature = "postgres")]
impl PostgresRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
#[async_trait::async_trait]
impl BulletinRepository for PostgresRepository {
    async fn upsert_bulletin(
        &self,
        bulletin: &Bulletin,
        entries: &[CategoryEntry],
        raw_html: Option<&[u8]>,
    ) -> Result<i64> {
        info!(
            "Upserting bulletin {}-{:02} with {} entries",
            bulletin.year,
            bulletin.month,
            entries.len()
        );

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bulletins (
                year, month, fiscal_year, bulletin_date, source_url, raw_html,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (year, month) DO UPDATE SET
                fiscal_year = excluded.fiscal_year,
                bulletin_date = excluded.bulletin_date,
                source_url = excluded.source_url,
                raw_html = COALESCE(excluded.raw_html, bulletins.raw_html),
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(bulletin.year)
        .bind(bulletin.month as i32)
        .bind(bulletin.fiscal_year)
        .bind(bulletin.bulletin_date)
        .bind(&bulletin.source_url)
        .bind(raw_html)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM category_entries WHERE bulletin_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO category_entries (
                    bulletin_id, category, country, chart, status, priority_date, notes
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(id)
            .bind(entry.category.as_str())
            .bind(entry.country.as_str())
            .bind(entry.chart.as_str())
            .bind(entry.status.as_str())
            .bind(entry.priority_date)
            .bind(&entry.notes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Committed bulletin id={}", id);
        Ok(id)
    }

    async fn get_bulletin(&self, year: i32, month: u32) -> Result<Option<Bulletin>> {
        let row = sqlx::query_as::<_, BulletinRow>(
            r#"
            SELECT id, year, month, fiscal_year, bulletin_date, source_url,
                   created_at, updated_at
            FROM bulletins WHERE year = $1 AND month = $2
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(BulletinRow::into_bulletin))
    }

    async fn list_bulletins(&self, fy_from: i32, fy_to: i32) -> Result<Vec<Bulletin>> {
        let rows = sqlx::query_as::<_, BulletinRow>(
            r#"
            SELECT id, year, month, fiscal_year, bulletin_date, source_url,
                   created_at, updated_at
            FROM bulletins
            WHERE fiscal_year >= $1 AND fiscal_year <= $2
            ORDER BY year, month
            "#,
        )
        .bind(fy_from)
        .bind(fy_to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(BulletinRow::into_bulletin).collect())
    }

    async fn get_entries(&self, year: i32, month: u32) -> Result<Vec<CategoryEntry>> {
        let rows = sqlx::query_as::<_, CategoryEntryRow>(
            r#"
            SELECT e.id, e.bulletin_id, e.category, e.country, e.chart, e.status,
                   e.priority_date, e.notes
            FROM category_entries e
            JOIN bulletins b ON e.bulletin_id = b.id
            WHERE b.year = $1 AND b.month = $2
            ORDER BY e.chart, e.category, e.country
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CategoryEntryRow::into_entry).collect()
    }

    async fn existing_months(&self, fy_from: i32, fy_to: i32) -> Result<HashSet<(i32, u32)>> {
        let rows: Vec<(i32, i32)> = sqlx::query_as(
            "SELECT year, month FROM bulletins WHERE fiscal_year >= $1 AND fiscal_year <= $2",
        )
        .bind(fy_from)
        .bind(fy_to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(y, m)| (y, m as u32)).collect())
    }

    async fn get_series(
        &self,
        key: &SeriesKey,
        fy_from: i32,
        fy_to: i32,
    ) -> Result<Vec<SeriesPoint>> {
        let rows = sqlx::query_as::<_, SeriesRow>(
            r#"
            SELECT b.bulletin_date, e.status, e.priority_date
            FROM category_entries e
            JOIN bulletins b ON e.bulletin_id = b.id
            WHERE e.category = $1 AND e.country = $2 AND e.chart = $3
              AND b.fiscal_year >= $4 AND b.fiscal_year <= $5
            ORDER BY b.year, b.month
            "#,
        )
        .bind(key.category.as_str())
        .bind(key.country.as_str())
        .bind(key.chart.as_str())
        .bind(fy_from)
        .bind(fy_to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SeriesRow::into_point).collect()
    }

    async fn get_stats(&self) -> Result<RepositoryStats> {
        let bulletin_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bulletins")
            .fetch_one(&self.pool)
            .await?;
        let entry_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM category_entries")
            .fetch_one(&self.pool)
            .await?;
        let (earliest, latest): (Option<chrono::NaiveDate>, Option<chrono::NaiveDate>) =
            sqlx::query_as("SELECT MIN(bulletin_date), MAX(bulletin_date) FROM bulletins")
                .fetch_one(&self.pool)
                .await?;
        let last_ingest_at: Option<chrono::DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(updated_at) FROM bulletins")
                .fetch_one(&self.pool)
                .await?;

        Ok(RepositoryStats {
            bulletin_count,
            entry_count,
            earliest,
            latest,
            last_ingest_at,
        })
    }

    async fn put_forecast(&self, forecast: &Forecast) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO forecasts (
                category, country, chart, target_year, target_month,
                predicted_date, confidence, model_id, produced_at, features_hash
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (category, country, chart, target_year, target_month)
            DO UPDATE SET
                predicted_date = excluded.predicted_date,
                confidence = excluded.confidence,
                model_id = excluded.model_id,
                produced_at = excluded.produced_at,
                features_hash = excluded.features_hash
            "#,
        )
        .bind(forecast.key.category.as_str())
        .bind(forecast.key.country.as_str())
        .bind(forecast.key.chart.as_str())
        .bind(forecast.key.target_year)
        .bind(forecast.key.target_month as i32)
        .bind(forecast.predicted_date)
        .bind(forecast.confidence)
        .bind(&forecast.model_id)
        .bind(forecast.produced_at)
        .bind(&forecast.features_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_forecast(&self, key: &ForecastKey) -> Result<Option<Forecast>> {
        let row = sqlx::query_as::<_, ForecastRow>(
            r#"
            SELECT category, country, chart, target_year, target_month,
                   predicted_date, confidence, model_id, produced_at, features_hash
            FROM forecasts
            WHERE category = $1 AND country = $2 AND chart = $3
              AND target_year = $4 AND target_month = $5
            "#,
        )
        .bind(key.category.as_str())
        .bind(key.country.as_str())
        .bind(key.chart.as_str())
        .bind(key.target_year)
        .bind(key.target_month as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ForecastRow::into_forecast).transpose()
    }

    async fn get_raw_html(&self, year: i32, month: u32) -> Result<Option<Vec<u8>>> {
        let row: Option<(Option<Vec<u8>>,)> =
            sqlx::query_as("SELECT raw_html FROM bulletins WHERE year = $1 AND month = $2")
                .bind(year)
                .bind(month as i32)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(blob,)| blob))
    }

    async fn months_with_raw_html(&self) -> Result<Vec<(i32, u32)>> {
        let rows: Vec<(i32, i32)> = sqlx::query_as(
            "SELECT year, month FROM bulletins WHERE raw_html IS NOT NULL ORDER BY year, month",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(y, m)| (y, m as u32)).collect())
    }
}
