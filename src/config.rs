//! Configuration loader: merges env vars, .env file, and geocoder.toml.

use common::{Error, GeocoderConfig};
use std::path::Path;

const CONFIG_FILE: &str = "geocoder.toml";
/// Row cap of the Census batch endpoint.
const MAX_BULK_CHUNK: usize = 10_000;

fn parse_u32(raw: &str, env_name: &str) -> Result<u32, Error> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer >= 0")))
}

fn parse_positive_usize(raw: &str, env_name: &str) -> Result<usize, Error> {
    let parsed = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn validate_config(config: &GeocoderConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.providers.order.is_empty() {
        issues.push("providers.order must name at least one provider".into());
    }
    for name in &config.providers.order {
        if !matches!(name.trim().to_ascii_lowercase().as_str(), "tiger" | "census" | "google") {
            issues.push(format!("providers.order has unknown provider '{name}'"));
        }
    }
    if config.providers.max_rating < 0 {
        issues.push("providers.max_rating must be >= 0".into());
    }
    if config.providers.tiger_max_results <= 0 {
        issues.push("providers.tiger_max_results must be > 0".into());
    }
    if config.providers.census_benchmark.trim().is_empty() {
        issues.push("providers.census_benchmark must not be empty".into());
    }
    if config.providers.census_vintage.trim().is_empty() {
        issues.push("providers.census_vintage must not be empty".into());
    }

    if config.rate_limits.census_per_sec == 0 {
        issues.push("rate_limits.census_per_sec must be > 0".into());
    }
    if config.rate_limits.google_per_sec == 0 {
        issues.push("rate_limits.google_per_sec must be > 0".into());
    }

    if config.batch.concurrency == 0 {
        issues.push("batch.concurrency must be > 0".into());
    }
    if config.batch.bulk_chunk_size == 0 {
        issues.push("batch.bulk_chunk_size must be > 0".into());
    }
    if config.batch.bulk_chunk_size > MAX_BULK_CHUNK {
        issues.push(format!("batch.bulk_chunk_size must be <= {MAX_BULK_CHUNK}"));
    }

    if config.cache.enabled && config.cache.table.trim().is_empty() {
        issues.push("cache.table must be set when caching is enabled".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides on top of file/default values.
fn apply_env<F>(config: &mut GeocoderConfig, var: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = var("DATABASE_URL") {
        config.database_url = url.trim().to_string();
    }
    if let Some(key) = var("GOOGLE_GEOCODING_API_KEY") {
        config.providers.google_api_key = key.trim().to_string();
    }
    if let Some(raw) = var("GEOCODE_CACHE_ENABLED") {
        config.cache.enabled = parse_bool(&raw);
    }
    if let Some(raw) = var("GEOCODE_CACHE_TTL_DAYS") {
        config.cache.ttl_days = parse_u32(&raw, "GEOCODE_CACHE_TTL_DAYS")?;
    }
    if let Some(table) = var("GEOCODE_CACHE_TABLE") {
        config.cache.table = table.trim().to_string();
    }
    if let Some(raw) = var("GEOCODE_MAX_RATING") {
        let parsed = parse_u32(&raw, "GEOCODE_MAX_RATING")?;
        config.providers.max_rating = i32::try_from(parsed)
            .map_err(|_| Error::Config("GEOCODE_MAX_RATING is out of range".into()))?;
    }
    if let Some(raw) = var("GEOCODE_BATCH_CONCURRENCY") {
        config.batch.concurrency = parse_positive_usize(&raw, "GEOCODE_BATCH_CONCURRENCY")?;
    }
    if let Some(raw) = var("GEOCODE_CENSUS_RPS") {
        config.rate_limits.census_per_sec = parse_u32(&raw, "GEOCODE_CENSUS_RPS")?;
    }
    if let Some(raw) = var("GEOCODE_GOOGLE_RPS") {
        config.rate_limits.google_per_sec = parse_u32(&raw, "GEOCODE_GOOGLE_RPS")?;
    }
    if let Some(raw) = var("GEOCODE_PROVIDERS") {
        config.providers.order = parse_list(&raw);
    }
    Ok(())
}

/// Load engine configuration from environment and optional config file.
pub fn load_config() -> Result<GeocoderConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = GeocoderConfig::default();

    // 3. Try loading geocoder.toml if it exists.
    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read {CONFIG_FILE}: {e}")))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {CONFIG_FILE}: {e}")))?;
    }

    // 4. Override with environment variables (highest priority).
    apply_env(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    Ok(config)
}
