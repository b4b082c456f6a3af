//! Paid Google fallback.

use async_trait::async_trait;
use common::{AddressInput, Error, GeocodeResult};
use google_geocode_client::{GoogleGeocodeClient, GoogleMatch};
use tokio_util::sync::CancellationToken;

use crate::normalize::format_one_line;
use crate::provider::{Provider, ProviderKind};

pub struct GoogleProvider {
    client: GoogleGeocodeClient,
}

impl GoogleProvider {
    pub fn new(client: GoogleGeocodeClient) -> Self {
        Self { client }
    }
}

fn result_from_match(m: GoogleMatch) -> GeocodeResult {
    GeocodeResult {
        latitude: m.latitude,
        longitude: m.longitude,
        source: ProviderKind::Google.as_str().to_string(),
        quality: Some(m.quality),
        matched: true,
        rating: 0,
        county_fips: String::new(),
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        ProviderKind::Google.as_str()
    }

    fn available(&self) -> bool {
        self.client.has_api_key()
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

        Ok(match self.client.geocode(cancel, &one_line).await? {
            Some(m) => result_from_match(m),
            None => GeocodeResult::unmatched(self.name()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Quality, RateLimiter};

    fn provider(key: &str) -> GoogleProvider {
        let limiter = RateLimiter::per_second("google", 10).unwrap();
        GoogleProvider::new(GoogleGeocodeClient::new(key.to_string(), limiter).unwrap())
    }

    #[test]
    fn test_availability_tracks_api_key() {
        assert!(!provider("").available());
        assert!(!provider("   ").available());
        assert!(provider("AIza-test").available());
    }

    #[test]
    fn test_match_keeps_vendor_quality() {
        let r = result_from_match(GoogleMatch {
            latitude: 25.7741,
            longitude: -80.1872,
            formatted_address: "100 S Biscayne Blvd".into(),
            quality: Quality::Centroid,
        });

        assert!(r.matched);
        assert_eq!(r.source, "google");
        assert_eq!(r.quality, Some(Quality::Centroid));
    }

    #[tokio::test]
    async fn test_missing_key_surfaces_not_configured() {
        let addr = AddressInput::new("1 Elm St", "Austin", "TX", "78701");
        let err = provider("")
            .geocode(&CancellationToken::new(), &addr)
            .await
            .unwrap_err();
        assert!(err.is_not_configured());
    }
}
