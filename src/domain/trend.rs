use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::category::{ChartType, Country, EntryStatus, VisaCategory};

/// Key of one (category, country, chart) time series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SeriesKey {
    pub category: VisaCategory,
    pub country: Country,
    pub chart: ChartType,
}

impl SeriesKey {
    pub fn new(category: VisaCategory, country: Country, chart: ChartType) -> Self {
        Self {
            category,
            country,
            chart,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.category, self.country, self.chart)
    }
}

/// One observation returned by `get_series`, ordered by bulletin date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub bulletin_date: NaiveDate,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_date: Option<NaiveDate>,
}

/// Direction of movement over an analysis window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Advancing,
    Stable,
    Retrogressing,
    Mixed,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Advancing => "ADVANCING",
            TrendDirection::Stable => "STABLE",
            TrendDirection::Retrogressing => "RETROGRESSING",
            TrendDirection::Mixed => "MIXED",
        }
    }

    /// Ordinal used as a model feature.
    pub fn ordinal(&self) -> f64 {
        match self {
            TrendDirection::Retrogressing => -1.0,
            TrendDirection::Mixed => 0.0,
            TrendDirection::Stable => 0.5,
            TrendDirection::Advancing => 1.0,
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derived movement statistics for one series over a window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrendSummary {
    pub key: SeriesKey,

    /// Window length in months; `None` means the full history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_months: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,

    /// Number of DATED observations in the window.
    pub observations: usize,

    pub total_advancement_days: i64,
    pub mean_monthly_days: f64,

    /// Population standard deviation of per-month deltas.
    pub volatility: f64,

    pub trend_direction: TrendDirection,

    /// Seasonal factor per calendar month (index 0 = January); `None` where
    /// fewer than two observations fall in that month.
    pub seasonal_factors: Vec<Option<f64>>,
}

impl TrendSummary {
    /// Summary for a series with no usable observations.
    pub fn empty(key: SeriesKey, window_months: Option<u32>) -> Self {
        Self {
            key,
            window_months,
            start_date: None,
            end_date: None,
            observations: 0,
            total_advancement_days: 0,
            mean_monthly_days: 0.0,
            volatility: 0.0,
            trend_direction: TrendDirection::Stable,
            seasonal_factors: vec![None; 12],
        }
    }
}

/// Key of a stored forecast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ForecastKey {
    pub category: VisaCategory,
    pub country: Country,
    pub chart: ChartType,
    pub target_year: i32,
    pub target_month: u32,
}

/// A stored prediction for one series and target month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub key: ForecastKey,
    pub predicted_date: NaiveDate,

    /// Model confidence in [0, 1].
    pub confidence: f64,

    pub model_id: String,
    pub produced_at: DateTime<Utc>,

    /// Hex SHA-256 over the feature vector and feature schema version, so
    /// callers can detect staleness.
    pub features_hash: String,
}

/// Repository-wide totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStats {
    pub bulletin_count: i64,
    pub entry_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ingest_at: Option<DateTime<Utc>>,
}
