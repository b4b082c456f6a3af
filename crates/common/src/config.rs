//! Engine configuration types.

use serde::{Deserialize, Serialize};

/// Top-level geocoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Postgres connection string for TIGER functions and the cache table.
    /// Empty disables both.
    #[serde(default)]
    pub database_url: String,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Provider cascade settings.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Outbound request budgets.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Batch fan-out settings.
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Positive/negative result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry lifetime in days. 0 = never expires.
    #[serde(default)]
    pub ttl_days: u32,

    /// Schema-qualified cache table name.
    #[serde(default = "default_cache_table")]
    pub table: String,
}

/// Cascade order and per-provider knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider names in priority order (`tiger`, `census`, `google`).
    #[serde(default = "default_order")]
    pub order: Vec<String>,

    /// TIGER results rated above this are reported as unmatched.
    #[serde(default = "default_max_rating")]
    pub max_rating: i32,

    /// Candidate rows requested from the TIGER `geocode` function.
    #[serde(default = "default_tiger_max_results")]
    pub tiger_max_results: i32,

    /// Paid API key. Empty leaves the Google provider unavailable.
    #[serde(default)]
    pub google_api_key: String,

    #[serde(default = "default_census_benchmark")]
    pub census_benchmark: String,

    #[serde(default = "default_census_vintage")]
    pub census_vintage: String,

    /// Use the Census multipart batch endpoint for bulk runs.
    #[serde(default = "default_true")]
    pub bulk_enabled: bool,
}

/// Requests per second allowed per network backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_census_rps")]
    pub census_per_sec: u32,

    #[serde(default = "default_google_rps")]
    pub google_per_sec: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Max addresses resolved concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Max rows per bulk submission (the Census API caps files at 10k).
    #[serde(default = "default_bulk_chunk_size")]
    pub bulk_chunk_size: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_cache_table() -> String {
    "public.geocode_cache".into()
}

fn default_order() -> Vec<String> {
    vec!["tiger".into(), "census".into(), "google".into()]
}
fn default_max_rating() -> i32 {
    100
}
fn default_tiger_max_results() -> i32 {
    1
}
fn default_census_benchmark() -> String {
    "Public_AR_Current".into()
}
fn default_census_vintage() -> String {
    "Current_Current".into()
}

fn default_census_rps() -> u32 {
    50
}
fn default_google_rps() -> u32 {
    50
}

fn default_concurrency() -> usize {
    10
}
fn default_bulk_chunk_size() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            ttl_days: 0,
            table: default_cache_table(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            max_rating: default_max_rating(),
            tiger_max_results: default_tiger_max_results(),
            google_api_key: String::new(),
            census_benchmark: default_census_benchmark(),
            census_vintage: default_census_vintage(),
            bulk_enabled: default_true(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            census_per_sec: default_census_rps(),
            google_per_sec: default_google_rps(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            bulk_chunk_size: default_bulk_chunk_size(),
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            cache: CacheConfig::default(),
            providers: ProvidersConfig::default(),
            rate_limits: RateLimitConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_fills_defaults() {
        let cfg: GeocoderConfig = serde_json::from_str(
            r#"{"cache": {"ttl_days": 30}, "providers": {"order": ["census"]}}"#,
        )
        .unwrap();

        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.ttl_days, 30);
        assert_eq!(cfg.cache.table, "public.geocode_cache");
        assert_eq!(cfg.providers.order, vec!["census".to_string()]);
        assert_eq!(cfg.providers.max_rating, 100);
        assert_eq!(cfg.rate_limits.census_per_sec, 50);
        assert_eq!(cfg.batch.concurrency, 10);
    }
}
