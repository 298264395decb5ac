// src/error.rs

//! Unified error handling for the aggregator.

use std::fmt;

use thiserror::Error;

/// Result type alias for aggregator operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Database query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote payload could not be understood
    #[error("Parse error for {context}: {message}")]
    Parse { context: String, message: String },

    /// Remote answered with a non-2xx status
    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// Remote asked us to slow down
    #[error("Rate limited by {0}")]
    RateLimited(String),

    /// Remote resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Operation was cancelled by its context
    #[error("Operation cancelled")]
    Cancelled,

    /// Every proxy tunnel has failed
    #[error("No proxy tunnel available")]
    NoProxy,

    /// Proxy tunnel failure
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// Too many identifiers in one request
    #[error("too many")]
    TooMany,

    /// Nothing could be assembled for the request
    #[error("no results")]
    NoResults,

    /// Identifier could not be parsed
    #[error("Invalid steam id: {0}")]
    InvalidSteamId(String),

    /// Job queue failure
    #[error("Queue error: {0}")]
    Queue(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a parse error with context.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Network level failures the queue should retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout(_) | Self::Proxy(_) | Self::NoProxy => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when the database rejected a row for violating a unique index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }

    /// HTTP status used by the read API for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::TooMany | Self::InvalidSteamId(_) | Self::Validation(_) | Self::NoResults => {
                400
            }
            Self::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Terse reason rendered as the JSON body of a failed read request.
    pub fn public_message(&self) -> String {
        match self.status_code() {
            500 => "internal error".to_string(),
            _ => self.to_string(),
        }
    }

    /// JSON body for the read API: a bare string with the reason.
    pub fn to_json_body(&self) -> serde_json::Value {
        serde_json::Value::String(self.public_message())
    }
}
