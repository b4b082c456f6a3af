//! Shared types, config, and error definitions for the geocoding engine.

pub mod cancel;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod types;

pub use cancel::run_cancellable;
pub use config::GeocoderConfig;
pub use error::Error;
pub use rate_limit::RateLimiter;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
