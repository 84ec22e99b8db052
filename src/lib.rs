//! visa-bulletin-ops - ingestion and analytics for the US Visa Bulletin
//!
//! This library fetches, parses, normalizes, and stores the State
//! Department's monthly Visa Bulletin, and derives trend and forecast
//! artifacts from the stored series.

pub mod analytics;
pub mod cli;
pub mod collector;
pub mod config;
pub mod domain;
pub mod fetch;
pub mod forecasting;
pub mod normalizer;
pub mod observability;
pub mod parser;
pub mod planner;
pub mod storage;

// Re-export commonly used types
pub use domain::{
    Bulletin, BulletinError, CategoryEntry, ChartType, Country, EntryStatus, Forecast,
    ForecastKey, RepositoryStats, Result, SeriesKey, SeriesPoint, TrendDirection, TrendSummary,
    VisaCategory,
};

pub use analytics::Analytics;
pub use collector::{CollectOptions, Collector, RunReport};
pub use config::{Config, StorageBackend};
pub use fetch::{FetchOutcome, Fetcher};
pub use forecasting::Forecaster;
pub use normalizer::QualityReport;
pub use planner::{MonthLabel, PlannedUrl};
pub use storage::{create_repository, BulletinRepository};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library with default configuration
pub fn init() -> Result<()> {
    observability::init_tracing();
    Ok(())
}
