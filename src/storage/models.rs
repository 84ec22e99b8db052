//! Row types shared by the repository implementations.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use std::str::FromStr;

use crate::domain::{
    Bulletin, BulletinError, CategoryEntry, ChartType, Country, EntryStatus, Forecast,
    ForecastKey, Result, SeriesPoint, VisaCategory,
};

#[derive(Debug, FromRow)]
pub struct BulletinRow {
    pub id: i64,
    pub year: i32,
    pub month: i32,
    pub fiscal_year: i32,
    pub bulletin_date: NaiveDate,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BulletinRow {
    pub fn into_bulletin(self) -> Bulletin {
        Bulletin {
            id: Some(self.id),
            year: self.year,
            month: self.month as u32,
            fiscal_year: self.fiscal_year,
            bulletin_date: self.bulletin_date,
            source_url: self.source_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CategoryEntryRow {
    pub id: i64,
    pub bulletin_id: i64,
    pub category: String,
    pub country: String,
    pub chart: String,
    pub status: String,
    pub priority_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl CategoryEntryRow {
    pub fn into_entry(self) -> Result<CategoryEntry> {
        Ok(CategoryEntry {
            id: Some(self.id),
            bulletin_id: Some(self.bulletin_id),
            category: VisaCategory::from_str(&self.category)
                .map_err(BulletinError::Internal)?,
            country: Country::from_str(&self.country).map_err(BulletinError::Internal)?,
            chart: ChartType::from_str(&self.chart).map_err(BulletinError::Internal)?,
            status: EntryStatus::from_str(&self.status).map_err(BulletinError::Internal)?,
            priority_date: self.priority_date,
            notes: self.notes,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct SeriesRow {
    pub bulletin_date: NaiveDate,
    pub status: String,
    pub priority_date: Option<NaiveDate>,
}

impl SeriesRow {
    pub fn into_point(self) -> Result<SeriesPoint> {
        Ok(SeriesPoint {
            bulletin_date: self.bulletin_date,
            status: EntryStatus::from_str(&self.status).map_err(BulletinError::Internal)?,
            priority_date: self.priority_date,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ForecastRow {
    pub category: String,
    pub country: String,
    pub chart: String,
    pub target_year: i32,
    pub target_month: i32,
    pub predicted_date: NaiveDate,
    pub confidence: f64,
    pub model_id: String,
    pub produced_at: DateTime<Utc>,
    pub features_hash: String,
}

impl ForecastRow {
    pub fn into_forecast(self) -> Result<Forecast> {
        Ok(Forecast {
            key: ForecastKey {
                category: VisaCategory::from_str(&self.category)
                    .map_err(BulletinError::Internal)?,
                country: Country::from_str(&self.country).map_err(BulletinError::Internal)?,
                chart: ChartType::from_str(&self.chart).map_err(BulletinError::Internal)?,
                target_year: self.target_year,
                target_month: self.target_month as u32,
            },
            predicted_date: self.predicted_date,
            confidence: self.confidence,
            model_id: self.model_id,
            produced_at: self.produced_at,
            features_hash: self.features_hash,
        })
    }
}
