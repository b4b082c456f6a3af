//! Wire an engine from configuration.
//!
//! Everything that can be rejected up front (provider names, table name,
//! rate limits) fails here as `Error::Config`, never at call time.

use std::collections::HashSet;
use std::sync::Arc;

use census_client::CensusClient;
use common::{Error, GeocoderConfig, RateLimiter};
use google_geocode_client::GoogleGeocodeClient;
use postgis_client::{PostgisClient, TableName};
use tracing::{info, warn};

use crate::cache::{CacheStore, MemoryCacheStore, PgCacheStore};
use crate::cascade::Geocoder;
use crate::provider::{Provider, ProviderKind};
use crate::providers::{CensusProvider, GoogleProvider, TigerProvider};
use crate::reverse::ReverseResolver;

/// Parse the configured cascade order, rejecting unknown and repeated names.
pub fn parse_order(names: &[String]) -> Result<Vec<ProviderKind>, Error> {
    if names.is_empty() {
        return Err(Error::Config("provider order is empty".into()));
    }

    let mut seen = HashSet::new();
    let mut order = Vec::with_capacity(names.len());
    for name in names {
        let kind: ProviderKind = name.parse()?;
        if !seen.insert(kind) {
            return Err(Error::Config(format!("provider '{kind}' listed twice")));
        }
        order.push(kind);
    }
    Ok(order)
}

/// Build the forward engine. `db` backs TIGER and the cache table.
pub fn build_geocoder(cfg: &GeocoderConfig, db: Option<PostgisClient>) -> Result<Geocoder, Error> {
    let order = parse_order(&cfg.providers.order)?;

    if cfg.batch.concurrency == 0 {
        return Err(Error::Config("batch concurrency must be at least 1".into()));
    }

    let mut providers: Vec<Arc<dyn Provider>> = Vec::with_capacity(order.len());
    for kind in order {
        match kind {
            ProviderKind::Tiger => match &db {
                Some(db) => {
                    let tiger = TigerProvider::new(Arc::new(db.clone()), cfg.providers.max_rating)
                        .with_max_results(cfg.providers.tiger_max_results);
                    providers.push(Arc::new(tiger));
                }
                None => warn!("No database configured, skipping TIGER provider"),
            },
            ProviderKind::Census => {
                let limiter = RateLimiter::per_second("census", cfg.rate_limits.census_per_sec)?;
                let client = CensusClient::new(
                    &cfg.providers.census_benchmark,
                    &cfg.providers.census_vintage,
                    limiter,
                )?;
                let census = CensusProvider::new(client).with_bulk(cfg.providers.bulk_enabled);
                providers.push(Arc::new(census));
            }
            ProviderKind::Google => {
                let limiter = RateLimiter::per_second("google", cfg.rate_limits.google_per_sec)?;
                let client = GoogleGeocodeClient::new(cfg.providers.google_api_key.clone(), limiter)?;
                if !client.has_api_key() {
                    info!("No Google API key set, Google provider will be skipped");
                }
                providers.push(Arc::new(GoogleProvider::new(client)));
            }
        }
    }

    let mut geocoder = Geocoder::new(providers)
        .with_concurrency(cfg.batch.concurrency)
        .with_bulk_chunk_size(cfg.batch.bulk_chunk_size);

    if cfg.cache.enabled {
        let cache: Arc<dyn CacheStore> = match db {
            Some(db) => Arc::new(PgCacheStore::new(db, &cfg.cache.table, cfg.cache.ttl_days)?),
            None => {
                TableName::parse(&cfg.cache.table)?;
                warn!("No database configured, caching results in memory only");
                Arc::new(MemoryCacheStore::new(cfg.cache.ttl_days))
            }
        };
        geocoder = geocoder.with_cache(cache);
    }

    info!(
        providers = ?geocoder.provider_names(),
        cache = geocoder.caching_enabled(),
        concurrency = cfg.batch.concurrency,
        "Geocoder ready"
    );
    Ok(geocoder)
}

/// Build the reverse resolver. It only exists on top of the spatial database.
pub fn build_reverse_resolver(db: Option<PostgisClient>) -> Result<ReverseResolver, Error> {
    match db {
        Some(db) => Ok(ReverseResolver::new(Arc::new(db))),
        None => Err(Error::NotConfigured(
            "reverse geocoding needs DATABASE_URL".into(),
        )),
    }
}
