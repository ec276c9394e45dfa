//! Custom error types for leadforge

use thiserror::Error;

/// Main error type for leadforge operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Scrape error: {0}")]
    Scrape(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Invalid service response: {0}")]
    InvalidResponse(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Lead not found: {0}")]
    LeadNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'leadforge init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors raised by an external scrape or generation call.
    ///
    /// These are absorbed into the affected lead's status instead of failing
    /// the whole batch.
    pub fn is_service_error(&self) -> bool {
        matches!(
            self,
            Error::Scrape(_)
                | Error::Generation(_)
                | Error::RateLimited(_)
                | Error::PaymentRequired(_)
                | Error::InvalidResponse(_)
                | Error::Http(_)
        )
    }
}

/// Result type alias for leadforge
pub type Result<T> = std::result::Result<T, Error>;
