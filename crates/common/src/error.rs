//! Unified error type for the geocoding engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Census geocoder error: {0}")]
    Census(String),

    #[error("Google geocoding API error: {0}")]
    Google(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    /// The backend is missing configuration (API key, connection) and
    /// should be skipped rather than counted as a failure.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No address found near ({lat}, {lng})")]
    ReverseNotFound { lat: f64, lng: f64 },

    #[error("Invalid coordinates ({lat}, {lng})")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Error::NotConfigured(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
