use thiserror::Error;

pub type Result<T> = std::result::Result<T, BulletinError>;

#[derive(Error, Debug)]
pub enum BulletinError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("URL template error: {0}")]
    UrlTemplate(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Bulletin not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Quality gate failed: {reason} (date_parse_rate={rate:.2})")]
    Quality { reason: String, rate: f64 },

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersion { expected: i64, found: i64 },

    #[error("Model artifact incompatible: {0}")]
    ModelArtifact(String),

    #[error("Insufficient observations: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BulletinError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        BulletinError::Config(msg.into())
    }

    pub fn network<S: Into<String>>(msg: S) -> Self {
        BulletinError::Network(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        BulletinError::Parse(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        BulletinError::Validation(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        BulletinError::Internal(msg.into())
    }

    /// Transport failures and 5xx responses are retried; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BulletinError::Network(_))
    }
}
