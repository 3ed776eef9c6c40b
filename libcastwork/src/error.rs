//! Error types for Castwork

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CastworkError>;

#[derive(Error, Debug)]
pub enum CastworkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Another {kind} run is in progress (lease held by {holder})")]
    RunInProgress { kind: String, holder: String },
}

impl CastworkError {
    /// Returns the process exit code for a run aborted by this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CastworkError::InvalidInput(_) => 3,
            CastworkError::Config(_) => 2,
            CastworkError::Database(_) => 2,
            CastworkError::RunInProgress { .. } => 4,
            CastworkError::Platform(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

/// Errors raised by platform adapters
///
/// Every variant is a target-level failure: the dispatcher records it against
/// the target (or analytics candidate) and moves on.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Publishing failed: {0}")]
    Publishing(String),

    #[error("Analytics fetch failed: {0}")]
    Analytics(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("No adapter registered for platform '{0}'")]
    NotFound(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),
}
