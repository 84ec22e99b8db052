use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{BulletinError, Result};

/// Default root of the State Department visa bulletin pages. Monthly pages
/// hang off this as `/{fiscal_year}/visa-bulletin-for-{month}-{year}.html`;
/// the index page is this plus `.html`.
pub const DEFAULT_SOURCE_BASE_URL: &str =
    "https://travel.state.gov/content/travel/en/legal/visa-law0/visa-bulletin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which repository backend the process runs against. A single, process-wide
/// decision made once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Single-file SQLite store.
    Embedded,
    /// PostgreSQL server store.
    Server,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Location/connection string for the chosen backend.
    #[serde(default = "default_dsn")]
    pub dsn: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base backoff before the first retry, in milliseconds.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// End-to-end budget for a single bulletin, including retries.
    #[serde(default = "default_bulletin_budget_seconds")]
    pub bulletin_budget_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Bulletins whose date-parse success rate falls below this are
    /// quarantined instead of committed.
    #[serde(default = "default_date_parse_min_rate")]
    pub date_parse_min_rate: f64,

    /// Priority dates farther than this from the bulletin date are treated as
    /// parse errors and dropped.
    #[serde(default = "default_max_drift_years")]
    pub max_drift_years: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Embedded
}

fn default_dsn() -> String {
    "sqlite://visa-bulletins.db".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_max_workers() -> usize {
    4
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_user_agent() -> String {
    format!("visa-bulletin-ops/{}", env!("CARGO_PKG_VERSION"))
}

fn default_bulletin_budget_seconds() -> u64 {
    120
}

fn default_base_url() -> String {
    DEFAULT_SOURCE_BASE_URL.to_string()
}

fn default_date_parse_min_rate() -> f64 {
    0.5
}

fn default_max_drift_years() -> i32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            dsn: default_dsn(),
            pool_size: default_pool_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            timeout_seconds: default_timeout_seconds(),
            retries: default_retries(),
            retry_base_ms: default_retry_base_ms(),
            user_agent: default_user_agent(),
            bulletin_budget_seconds: default_bulletin_budget_seconds(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            date_parse_min_rate: default_date_parse_min_rate(),
            max_drift_years: default_max_drift_years(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            http: HttpConfig::default(),
            source: SourceConfig::default(),
            quality: QualityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration: defaults, then the optional TOML file, then the
    /// documented environment variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the documented environment variables. Unset variables leave
    /// the current value untouched; unparsable values are configuration
    /// errors, never silently ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("STORAGE_BACKEND") {
            self.storage.backend = match backend.to_lowercase().as_str() {
                "embedded" => StorageBackend::Embedded,
                "server" => StorageBackend::Server,
                other => {
                    return Err(BulletinError::config(format!(
                        "STORAGE_BACKEND must be 'embedded' or 'server', got '{other}'"
                    )))
                }
            };
        }
        if let Ok(dsn) = std::env::var("STORAGE_DSN") {
            self.storage.dsn = dsn;
        }
        if let Ok(workers) = std::env::var("HTTP_MAX_WORKERS") {
            self.http.max_workers = workers
                .parse()
                .map_err(|_| BulletinError::config(format!("invalid HTTP_MAX_WORKERS: {workers}")))?;
        }
        if let Ok(timeout) = std::env::var("HTTP_TIMEOUT_SECONDS") {
            self.http.timeout_seconds = timeout.parse().map_err(|_| {
                BulletinError::config(format!("invalid HTTP_TIMEOUT_SECONDS: {timeout}"))
            })?;
        }
        if let Ok(retries) = std::env::var("HTTP_RETRIES") {
            self.http.retries = retries
                .parse()
                .map_err(|_| BulletinError::config(format!("invalid HTTP_RETRIES: {retries}")))?;
        }
        if let Ok(agent) = std::env::var("USER_AGENT") {
            self.http.user_agent = agent;
        }
        if let Ok(base) = std::env::var("SOURCE_BASE_URL") {
            self.source.base_url = base;
        }
        if let Ok(rate) = std::env::var("DATE_PARSE_MIN_RATE") {
            self.quality.date_parse_min_rate = rate.parse().map_err(|_| {
                BulletinError::config(format!("invalid DATE_PARSE_MIN_RATE: {rate}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.dsn.is_empty() {
            return Err(BulletinError::config("storage DSN cannot be empty"));
        }
        if self.storage.pool_size == 0 {
            return Err(BulletinError::config("pool size must be greater than 0"));
        }
        if self.http.max_workers == 0 {
            return Err(BulletinError::config("max workers must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.quality.date_parse_min_rate) {
            return Err(BulletinError::config(
                "date parse min rate must be within [0, 1]",
            ));
        }
        if self.source.base_url.is_empty() {
            return Err(BulletinError::config("source base URL cannot be empty"));
        }
        #[cfg(not(feature = "postgres"))]
        if self.storage.backend == StorageBackend::Server {
            return Err(BulletinError::config(
                "server backend requires the 'postgres' feature",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::Embedded);
        assert_eq!(config.http.max_workers, 4);
        assert_eq!(config.http.timeout_seconds, 30);
        assert_eq!(config.http.retries, 3);
        assert_eq!(config.quality.date_parse_min_rate, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_sections_fall_back() {
        let toml_str = r#"
            [storage]
            backend = "embedded"
            dsn = "sqlite://tmp/test.db"

            [http]
            max_workers = 8

            [quality]
            date_parse_min_rate = 0.75
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.dsn, "sqlite://tmp/test.db");
        assert_eq!(config.http.max_workers, 8);
        assert_eq!(config.quality.date_parse_min_rate, 0.75);
        assert_eq!(config.http.retries, 3);
    }

    #[test]
    fn test_validate_rejects_bad_rate() {
        let mut config = Config::default();
        config.quality.date_parse_min_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.http.max_workers = 0;
        assert!(config.validate().is_err());
    }
}
