//! Single-address resolution: cache lookup, provider cascade, cache write.
//!
//! Providers are tried one at a time in priority order and at most once
//! each. Only cancellation is reported as an error; every other failure
//! is logged and the cascade moves on.

use std::ops::Range;
use std::sync::Arc;

use common::{run_cancellable, AddressInput, Error, GeocodeResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument, Span};

use crate::cache::CacheStore;
use crate::normalize::{cache_key, short_key};
use crate::provider::Provider;

const DEFAULT_CONCURRENCY: usize = 10;

/// The resolution engine. Cheap to clone; clones share providers and cache.
#[derive(Clone)]
pub struct Geocoder {
    pub(crate) providers: Arc<Vec<Arc<dyn Provider>>>,
    pub(crate) cache: Option<Arc<dyn CacheStore>>,
    pub(crate) concurrency: usize,
    pub(crate) bulk_chunk_size: usize,
    span: Span,
}

impl Geocoder {
    /// Build a cascade over `providers`, highest priority first.
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            providers: Arc::new(providers),
            cache: None,
            concurrency: DEFAULT_CONCURRENCY,
            bulk_chunk_size: census_client::MAX_BATCH_ROWS,
            span: tracing::info_span!("geocoder"),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Max addresses in flight during batch calls (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_bulk_chunk_size(mut self, size: usize) -> Self {
        self.bulk_chunk_size = size.max(1);
        self
    }

    /// Span that all of this geocoder's log events are recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub fn caching_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Resolve one address.
    ///
    /// Always yields a result (possibly unmatched) unless `cancel` fires.
    pub async fn geocode(
        &self,
        cancel: &CancellationToken,
        addr: &AddressInput,
    ) -> Result<GeocodeResult, Error> {
        self.resolve(cancel, addr, 0, None).await
    }

    /// Like [`geocode`](Self::geocode) but starts the cascade at position
    /// `from`. Providers before it are assumed already tried; `prior` names
    /// the last of them that was attempted.
    pub(crate) async fn resolve(
        &self,
        cancel: &CancellationToken,
        addr: &AddressInput,
        from: usize,
        prior: Option<&str>,
    ) -> Result<GeocodeResult, Error> {
        let span = self.span.clone();
        async move {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let key = cache_key(addr);

            if let Some(hit) = self.cache_lookup(cancel, &key).await? {
                return Ok(hit);
            }

            let result = self
                .cascade(cancel, addr, from..self.providers.len(), prior)
                .await?;

            self.cache_store(cancel, &key, &result).await;

            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// A storage failure reads as a miss; only cancellation is returned.
    pub(crate) async fn cache_lookup(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Option<GeocodeResult>, Error> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };

        match run_cancellable(cancel, cache.check(key)).await {
            Ok(Some(hit)) => {
                debug!(
                    key = short_key(key),
                    source = %hit.source,
                    matched = hit.matched,
                    "Cache hit"
                );
                Ok(Some(hit))
            }
            Ok(None) => {
                debug!(key = short_key(key), "Cache miss");
                Ok(None)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(key = short_key(key), error = %e, "Cache lookup failed, resolving uncached");
                Ok(None)
            }
        }
    }

    /// Write failures are logged and swallowed.
    pub(crate) async fn cache_store(
        &self,
        cancel: &CancellationToken,
        key: &str,
        result: &GeocodeResult,
    ) {
        let Some(cache) = &self.cache else {
            return;
        };

        match run_cancellable(cancel, cache.store(key, result)).await {
            Ok(()) => debug!(key = short_key(key), matched = result.matched, "Cached result"),
            Err(e) => warn!(key = short_key(key), error = %e, "Cache write failed"),
        }
    }

    /// Try the providers at `positions` in order without touching the cache.
    ///
    /// An unmatched result names the last provider attempted, falling back
    /// to `prior` when none in range was.
    pub(crate) async fn cascade<'a>(
        &'a self,
        cancel: &CancellationToken,
        addr: &AddressInput,
        positions: Range<usize>,
        prior: Option<&'a str>,
    ) -> Result<GeocodeResult, Error> {
        let mut last_attempted = prior;
        let providers = self.providers.get(positions).unwrap_or_default();

        for provider in providers {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let name = provider.name();
            if !provider.available() {
                debug!(provider = name, "Provider unavailable, skipping");
                continue;
            }

            match run_cancellable(cancel, provider.geocode(cancel, addr)).await {
                Ok(result) if result.matched => {
                    debug!(
                        provider = name,
                        quality = ?result.quality,
                        rating = result.rating,
                        "Matched"
                    );
                    return Ok(result);
                }
                Ok(_) => {
                    debug!(provider = name, "No match");
                    last_attempted = Some(name);
                }
                Err(e) if e.is_not_configured() => {
                    debug!(provider = name, "Provider not configured, skipping");
                }
                Err(e) => {
                    warn!(provider = name, error = %e, "Provider failed, trying next");
                    last_attempted = Some(name);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        Ok(GeocodeResult::unmatched(last_attempted.unwrap_or_default()))
    }
}
