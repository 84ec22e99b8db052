// Core domain models for the bulletin pipeline

pub mod bulletin;
pub mod category;
pub mod error;
pub mod trend;

pub use bulletin::{calendar_month_of, fiscal_year_for, Bulletin, CategoryEntry};
pub use category::{ChartType, Country, EntryStatus, VisaCategory};
pub use error::{BulletinError, Result};
pub use trend::{
    Forecast, ForecastKey, RepositoryStats, SeriesKey, SeriesPoint, TrendDirection, TrendSummary,
};
