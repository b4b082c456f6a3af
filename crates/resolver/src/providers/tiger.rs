//! Local TIGER geocoder running inside PostGIS.

use std::sync::Arc;

use async_trait::async_trait;
use common::{run_cancellable, AddressInput, Error, GeocodeResult, Quality};
use postgis_client::TigerRow;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::normalize::format_one_line;
use crate::provider::{Provider, ProviderKind};
use crate::spatial::SpatialBackend;

pub struct TigerProvider {
    backend: Arc<dyn SpatialBackend>,
    max_rating: i32,
    max_results: i32,
}

impl TigerProvider {
    pub fn new(backend: Arc<dyn SpatialBackend>, max_rating: i32) -> Self {
        Self {
            backend,
            max_rating,
            max_results: 1,
        }
    }

    pub fn with_max_results(mut self, max_results: i32) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    fn to_result(&self, row: TigerRow) -> GeocodeResult {
        let source = ProviderKind::Tiger.as_str();

        if row.rating > self.max_rating {
            debug!(
                rating = row.rating,
                max_rating = self.max_rating,
                "TIGER match rejected by rating threshold"
            );
            return GeocodeResult {
                rating: row.rating,
                ..GeocodeResult::unmatched(source)
            };
        }

        GeocodeResult {
            latitude: row.latitude,
            longitude: row.longitude,
            source: source.to_string(),
            quality: Some(Quality::from_rating(row.rating)),
            matched: true,
            rating: row.rating,
            county_fips: row.county_fips.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Provider for TigerProvider {
    fn name(&self) -> &str {
        ProviderKind::Tiger.as_str()
    }

    async fn geocode(
        &self,
        cancel: &CancellationToken,
        addr: &AddressInput,
    ) -> Result<GeocodeResult, Error> {
        let one_line = format_one_line(addr);
        if one_line.is_empty() {
            return Ok(GeocodeResult::unmatched(self.name()));
        }

        match run_cancellable(cancel, self.backend.geocode(&one_line, self.max_results)).await? {
            Some(row) => Ok(self.to_result(row)),
            None => Ok(GeocodeResult::unmatched(self.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubSpatial;

    fn biscayne() -> AddressInput {
        AddressInput::new("100 S Biscayne Blvd", "Miami", "FL", "33131")
    }

    #[tokio::test]
    async fn test_good_rating_is_rooftop_match() {
        let provider = TigerProvider::new(Arc::new(StubSpatial::with_rating(5)), 100);
        let r = provider
            .geocode(&CancellationToken::new(), &biscayne())
            .await
            .unwrap();

        assert!(r.matched);
        assert_eq!(r.quality, Some(Quality::Rooftop));
        assert_eq!(r.rating, 5);
        assert_eq!(r.source, "tiger");
        assert_eq!(r.county_fips, "12086");
    }

    #[tokio::test]
    async fn test_rating_above_threshold_is_unmatched_but_reported() {
        let provider = TigerProvider::new(Arc::new(StubSpatial::with_rating(42)), 20);
        let r = provider
            .geocode(&CancellationToken::new(), &biscayne())
            .await
            .unwrap();

        assert!(!r.matched);
        assert_eq!(r.rating, 42);
        assert_eq!(r.quality, None);
    }

    #[tokio::test]
    async fn test_rating_at_threshold_is_accepted() {
        let provider = TigerProvider::new(Arc::new(StubSpatial::with_rating(20)), 20);
        let r = provider
            .geocode(&CancellationToken::new(), &biscayne())
            .await
            .unwrap();

        assert!(r.matched);
        assert_eq!(r.quality, Some(Quality::Centroid));
    }

    #[tokio::test]
    async fn test_no_rows_is_unmatched() {
        let provider = TigerProvider::new(Arc::new(StubSpatial::default()), 100);
        let r = provider
            .geocode(&CancellationToken::new(), &biscayne())
            .await
            .unwrap();
        assert!(!r.matched);
    }

    #[tokio::test]
    async fn test_blank_address_skips_database() {
        let backend = Arc::new(StubSpatial::with_rating(0));
        let provider = TigerProvider::new(backend.clone(), 100);

        let r = provider
            .geocode(&CancellationToken::new(), &AddressInput::default())
            .await
            .unwrap();

        assert!(!r.matched);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_database_failure_is_error() {
        let backend = StubSpatial {
            fail: true,
            ..StubSpatial::default()
        };
        let provider = TigerProvider::new(Arc::new(backend), 100);

        let err = provider
            .geocode(&CancellationToken::new(), &biscayne())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_query() {
        let backend = Arc::new(StubSpatial::with_rating(5));
        let provider = TigerProvider::new(backend.clone(), 100);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider.geocode(&cancel, &biscayne()).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(backend.calls(), 0);
    }
}
