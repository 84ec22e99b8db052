#![allow(dead_code)]

use chrono::{Datelike, Months, NaiveDate};
use std::sync::Arc;

use visa_bulletin_ops::config::{Config, StorageBackend, StorageConfig};
use visa_bulletin_ops::domain::{
    Bulletin, CategoryEntry, ChartType, Country, SeriesKey, VisaCategory,
};
use visa_bulletin_ops::storage::{create_repository, BulletinRepository};

pub fn memory_storage_config() -> StorageConfig {
    StorageConfig {
        backend: StorageBackend::Embedded,
        dsn: "sqlite::memory:".to_string(),
        pool_size: 10,
    }
}

pub async fn memory_repo() -> Arc<dyn BulletinRepository> {
    create_repository(&memory_storage_config())
        .await
        .expect("failed to create in-memory repository")
}

/// Configuration pointed at a mock server, with fast retries.
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.storage = memory_storage_config();
    config.source.base_url = base_url.to_string();
    config.http.max_workers = 4;
    config.http.timeout_seconds = 5;
    config.http.retry_base_ms = 1;
    config.http.bulletin_budget_seconds = 30;
    config
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const MONTH_ABBREVS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month - 1) as usize]
}

/// Canonical bulletin cell form, e.g. 15JAN23.
pub fn ddmmmyy(date: NaiveDate) -> String {
    format!(
        "{:02}{}{:02}",
        date.day(),
        MONTH_ABBREVS[(date.month() - 1) as usize],
        date.year() % 100
    )
}

/// A realistic two-chart bulletin document for `(year, month)` with the
/// given EB cutoff cells.
pub fn bulletin_html(
    year: i32,
    month: u32,
    eb2_china: &str,
    eb2_india: &str,
    eb3_india: &str,
) -> String {
    format!(
        r#"<html><body>
        <h1>Visa Bulletin For {name} {year}</h1>
        <p>Number 42 Volume X, issued {name} 1, {year}</p>
        <h2>A. Final Action Dates for Employment-Based Preference Cases</h2>
        <table>
          <tr><td>Employment-based</td><td>All Chargeability Areas Except Those Listed</td>
              <td>CHINA-mainland born</td><td>INDIA</td><td>MEXICO</td><td>PHILIPPINES</td></tr>
          <tr><td>1st</td><td>C</td><td>C</td><td>C</td><td>C</td><td>C</td></tr>
          <tr><td>2nd</td><td>C</td><td>{eb2_china}</td><td>{eb2_india}</td><td>C</td><td>C</td></tr>
          <tr><td>3rd</td><td>C</td><td>{eb3_india}</td><td>{eb3_india}</td><td>C</td><td>C</td></tr>
          <tr><td>Other Workers</td><td>{eb3_india}</td><td>{eb3_india}</td><td>{eb3_india}</td><td>{eb3_india}</td><td>{eb3_india}</td></tr>
        </table>
        <h2>B. Dates for Filing of Employment-Based Visa Applications</h2>
        <table>
          <tr><td>Employment-based</td><td>All Chargeability Areas Except Those Listed</td>
              <td>CHINA-mainland born</td><td>INDIA</td><td>MEXICO</td><td>PHILIPPINES</td></tr>
          <tr><td>2nd</td><td>C</td><td>{eb2_china}</td><td>{eb2_india}</td><td>C</td><td>C</td></tr>
        </table>
        </body></html>"#,
        name = month_name(month),
    )
}

/// A bulletin whose cutoff cells are mostly garbage: 1 of 12 date-bearing
/// cells parses, putting the date-parse rate well below the default floor.
pub fn garbage_bulletin_html(year: i32, month: u32) -> String {
    let garbage_row = "<td>pending</td><td>tbd</td><td>n/a</td>";
    format!(
        r#"<html><body>
        <h1>Visa Bulletin For {name} {year}</h1>
        <h2>A. Final Action Dates for Employment-Based Preference Cases</h2>
        <table>
          <tr><td>Employment-based</td><td>CHINA-mainland born</td><td>INDIA</td><td>MEXICO</td></tr>
          <tr><td>1st</td><td>15JAN23</td><td>pending</td><td>soon</td></tr>
          <tr><td>2nd</td>{garbage_row}</tr>
          <tr><td>3rd</td>{garbage_row}</tr>
          <tr><td>4th</td><td>later</td><td></td><td>??</td></tr>
        </table>
        </body></html>"#,
        name = month_name(month),
    )
}

/// The monthly page URL the planner derives for `(fiscal_year, year, month)`
/// under `base_url`, as a path for mock matching.
pub fn monthly_path(fiscal_year: i32, year: i32, month: u32) -> String {
    format!(
        "/visa-bulletin/{}/visa-bulletin-for-{}-{}.html",
        fiscal_year,
        month_name(month).to_lowercase(),
        year
    )
}

/// Seed `months` consecutive monthly observations for `key`, starting at
/// `(start_year, start_month)`, advancing the priority date by `step_days`
/// each month.
pub async fn seed_series(
    repo: &Arc<dyn BulletinRepository>,
    key: &SeriesKey,
    start_year: i32,
    start_month: u32,
    months: usize,
    step_days: i64,
) {
    let mut priority = date(2012, 1, 1);
    for i in 0..months {
        let bulletin_date = date(start_year, start_month, 1)
            .checked_add_months(Months::new(i as u32))
            .unwrap();
        let bulletin = Bulletin::new(
            bulletin_date.year(),
            bulletin_date.month(),
            bulletin_date,
            format!("https://example.gov/{}", bulletin_date),
        );
        let entry = CategoryEntry::dated(key.category, key.country, key.chart, priority);
        repo.upsert_bulletin(&bulletin, &[entry], None)
            .await
            .expect("seed upsert failed");
        priority += chrono::Duration::days(step_days);
    }
}

pub fn eb2_india_key() -> SeriesKey {
    SeriesKey::new(VisaCategory::Eb2, Country::India, ChartType::FinalAction)
}
