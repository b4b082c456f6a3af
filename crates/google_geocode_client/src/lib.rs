//! Google Maps Platform Geocoding API client.
//!
//! Paid fallback: every call costs money, so callers should only reach it
//! after cheaper backends came up empty.

use common::{Error, Quality, RateLimiter};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Google Geocoding API client.
#[derive(Debug, Clone)]
pub struct GoogleGeocodeClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
    limiter: RateLimiter,
}

/// Response from `geocode/json`.
#[derive(Debug, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeCandidate>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeCandidate {
    #[serde(default)]
    pub formatted_address: String,
    pub geometry: Geometry,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
    #[serde(default)]
    pub location_type: String,
}

#[derive(Debug, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// The first candidate of a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleMatch {
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: String,
    pub quality: Quality,
}

/// Map the API's `location_type` onto a precision tier.
pub fn quality_for_location_type(location_type: &str) -> Quality {
    match location_type {
        "ROOFTOP" => Quality::Rooftop,
        "RANGE_INTERPOLATED" => Quality::Range,
        "GEOMETRIC_CENTER" => Quality::Centroid,
        _ => Quality::Approximate,
    }
}

impl GoogleGeocodeClient {
    pub fn new(api_key: String, limiter: RateLimiter) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent("geocode-enricher/0.1")
            .pool_max_idle_per_host(8)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(format!("failed to build Google HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            url: GEOCODE_URL.to_string(),
            limiter,
        })
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Geocode a one-line address. `Ok(None)` means `ZERO_RESULTS`.
    pub async fn geocode(
        &self,
        cancel: &CancellationToken,
        address: &str,
    ) -> Result<Option<GoogleMatch>, Error> {
        if !self.has_api_key() {
            return Err(Error::NotConfigured("google: API key not set".into()));
        }

        self.limiter.wait(cancel).await?;

        debug!("Google geocode lookup: {}", address);

        let resp = self
            .client
            .get(&self.url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| Error::Google(format!("HTTP error: {}", e.without_url())))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Google(format!(
                "Google returned {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let payload: GeocodeResponse = resp
            .json()
            .await
            .map_err(|e| Error::Google(format!("JSON parse error: {e}")))?;

        first_match(payload)
    }
}

fn first_match(payload: GeocodeResponse) -> Result<Option<GoogleMatch>, Error> {
    match payload.status.as_str() {
        "OK" => Ok(payload.results.into_iter().next().map(|c| GoogleMatch {
            latitude: c.geometry.location.lat,
            longitude: c.geometry.location.lng,
            quality: quality_for_location_type(&c.geometry.location_type),
            formatted_address: c.formatted_address,
        })),
        "ZERO_RESULTS" => Ok(None),
        other => Err(Error::Google(format!(
            "status {}: {}",
            other,
            payload.error_message.unwrap_or_default()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> &'static str {
        r#"{
            "results": [
                {
                    "formatted_address": "100 S Biscayne Blvd, Miami, FL 33131, USA",
                    "geometry": {
                        "location": {"lat": 25.7741, "lng": -80.1872},
                        "location_type": "ROOFTOP",
                        "viewport": {
                            "northeast": {"lat": 25.7755, "lng": -80.1858},
                            "southwest": {"lat": 25.7728, "lng": -80.1885}
                        }
                    },
                    "place_id": "ChIJ"
                }
            ],
            "status": "OK"
        }"#
    }

    #[test]
    fn test_ok_response_maps_first_candidate() {
        let parsed: GeocodeResponse = serde_json::from_str(sample_response()).unwrap();
        let m = first_match(parsed).unwrap().expect("should match");

        assert!((m.latitude - 25.7741).abs() < 1e-9);
        assert!((m.longitude + 80.1872).abs() < 1e-9);
        assert_eq!(m.quality, Quality::Rooftop);
    }

    #[test]
    fn test_zero_results_is_none() {
        let parsed: GeocodeResponse =
            serde_json::from_str(r#"{"results": [], "status": "ZERO_RESULTS"}"#).unwrap();
        assert!(first_match(parsed).unwrap().is_none());
    }

    #[test]
    fn test_denied_request_is_error() {
        let parsed: GeocodeResponse = serde_json::from_str(
            r#"{"results": [], "status": "REQUEST_DENIED", "error_message": "The provided API key is invalid."}"#,
        )
        .unwrap();
        let err = first_match(parsed).unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
    }

    #[test]
    fn test_location_type_table() {
        assert_eq!(quality_for_location_type("ROOFTOP"), Quality::Rooftop);
        assert_eq!(quality_for_location_type("RANGE_INTERPOLATED"), Quality::Range);
        assert_eq!(quality_for_location_type("GEOMETRIC_CENTER"), Quality::Centroid);
        assert_eq!(quality_for_location_type("APPROXIMATE"), Quality::Approximate);
        assert_eq!(quality_for_location_type(""), Quality::Approximate);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let limiter = RateLimiter::per_second("google", 10).unwrap();
        let client = GoogleGeocodeClient::new(String::new(), limiter).unwrap();

        let err = client
            .geocode(&CancellationToken::new(), "100 Main St")
            .await
            .unwrap_err();
        assert!(err.is_not_configured());
    }
}
