//! US Census Bureau geocoder client.
//!
//! Single-address lookups go through `geographies/onelineaddress` so the
//! county FIPS comes back with the coordinates. Bulk lookups live in
//! [`bulk`].

pub mod bulk;

use common::{Error, RateLimiter};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use bulk::{BulkMatch, BulkRecord, MAX_BATCH_ROWS};

const BASE_URL: &str = "https://geocoding.geo.census.gov/geocoder";
const ONELINE_PATH: &str = "/geographies/onelineaddress";

/// Census geocoder client with its own rate limiter.
#[derive(Debug, Clone)]
pub struct CensusClient {
    client: reqwest::Client,
    base_url: String,
    benchmark: String,
    vintage: String,
    limiter: RateLimiter,
}

// ── Census response types ─────────────────────────────────────────────

/// Response from `/geographies/onelineaddress?format=json`.
#[derive(Debug, Deserialize)]
pub struct OnelineResponse {
    pub result: OnelineResult,
}

#[derive(Debug, Deserialize)]
pub struct OnelineResult {
    #[serde(rename = "addressMatches", default)]
    pub address_matches: Vec<AddressMatch>,
}

#[derive(Debug, Deserialize)]
pub struct AddressMatch {
    #[serde(rename = "matchedAddress", default)]
    pub matched_address: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub geographies: Option<Geographies>,
}

/// `x` is longitude, `y` is latitude.
#[derive(Debug, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Deserialize)]
pub struct Geographies {
    #[serde(rename = "Counties", default)]
    pub counties: Vec<County>,
}

#[derive(Debug, Deserialize)]
pub struct County {
    #[serde(rename = "GEOID", default)]
    pub geoid: String,
}

/// The best candidate from a single-address lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CensusMatch {
    pub latitude: f64,
    pub longitude: f64,
    pub matched_address: String,
    /// True when the geocoder returned exactly one candidate.
    pub exact: bool,
    pub county_fips: Option<String>,
}

// ── Implementation ────────────────────────────────────────────────────

impl CensusClient {
    pub fn new(benchmark: &str, vintage: &str, limiter: RateLimiter) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent("geocode-enricher/0.1")
            .pool_max_idle_per_host(8)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(format!("failed to build Census HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            benchmark: benchmark.to_string(),
            vintage: vintage.to_string(),
            limiter,
        })
    }

    /// Point the client at a different host (staging mirrors, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Look up one address written on a single line.
    ///
    /// `Ok(None)` means the geocoder answered but found nothing.
    pub async fn geocode_oneline(
        &self,
        cancel: &CancellationToken,
        address: &str,
    ) -> Result<Option<CensusMatch>, Error> {
        self.limiter.wait(cancel).await?;

        debug!("Census oneline lookup: {}", address);

        let resp = self
            .client
            .get(self.url(ONELINE_PATH))
            .query(&[
                ("address", address),
                ("benchmark", self.benchmark.as_str()),
                ("vintage", self.vintage.as_str()),
                ("layers", "Counties"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| Error::Census(format!("HTTP error: {e}")))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Census(format!(
                "Census returned {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let data: OnelineResponse = resp
            .json()
            .await
            .map_err(|e| Error::Census(format!("JSON parse error: {e}")))?;

        debug!(
            "Census returned {} candidate(s)",
            data.result.address_matches.len()
        );

        Ok(best_match(data))
    }
}

/// Pick the first candidate; a lone candidate counts as exact.
fn best_match(resp: OnelineResponse) -> Option<CensusMatch> {
    let exact = resp.result.address_matches.len() == 1;
    let first = resp.result.address_matches.into_iter().next()?;

    let county_fips = first
        .geographies
        .and_then(|g| g.counties.into_iter().next())
        .map(|c| c.geoid)
        .filter(|geoid| !geoid.is_empty());

    Some(CensusMatch {
        latitude: first.coordinates.y,
        longitude: first.coordinates.x,
        matched_address: first.matched_address,
        exact,
        county_fips,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> &'static str {
        r#"{
            "result": {
                "input": {
                    "address": {"address": "100 S Biscayne Blvd, Miami, FL 33131"},
                    "benchmark": {"benchmarkName": "Public_AR_Current"}
                },
                "addressMatches": [
                    {
                        "tigerLine": {"side": "L", "tigerLineId": "94451233"},
                        "coordinates": {"x": -80.18727, "y": 25.77408},
                        "addressComponents": {"zip": "33131", "city": "MIAMI", "state": "FL"},
                        "matchedAddress": "100 S BISCAYNE BLVD, MIAMI, FL, 33131",
                        "geographies": {
                            "Counties": [{"GEOID": "12086", "STATE": "12", "COUNTY": "086", "NAME": "Miami-Dade County"}]
                        }
                    }
                ]
            }
        }"#
    }

    #[test]
    fn test_single_candidate_is_exact_with_fips() {
        let parsed: OnelineResponse = serde_json::from_str(sample_response()).unwrap();
        let m = best_match(parsed).expect("should match");

        assert!(m.exact);
        assert!((m.latitude - 25.77408).abs() < 1e-9);
        assert!((m.longitude + 80.18727).abs() < 1e-9);
        assert_eq!(m.county_fips.as_deref(), Some("12086"));
        assert_eq!(m.matched_address, "100 S BISCAYNE BLVD, MIAMI, FL, 33131");
    }

    #[test]
    fn test_empty_match_list_is_none() {
        let parsed: OnelineResponse =
            serde_json::from_str(r#"{"result": {"addressMatches": []}}"#).unwrap();
        assert!(best_match(parsed).is_none());
    }

    #[test]
    fn test_multiple_candidates_are_non_exact() {
        let parsed: OnelineResponse = serde_json::from_str(
            r#"{"result": {"addressMatches": [
                {"coordinates": {"x": -80.1, "y": 25.7}, "matchedAddress": "A"},
                {"coordinates": {"x": -80.2, "y": 25.8}, "matchedAddress": "B"}
            ]}}"#,
        )
        .unwrap();

        let m = best_match(parsed).unwrap();
        assert!(!m.exact);
        assert_eq!(m.matched_address, "A");
        assert_eq!(m.county_fips, None);
    }

    #[tokio::test]
    async fn test_cancelled_lookup_never_sends() {
        let limiter = RateLimiter::per_second("census", 1).unwrap();
        assert!(limiter.try_acquire());
        let client = CensusClient::new("Public_AR_Current", "Current_Current", limiter)
            .unwrap()
            .with_base_url("http://127.0.0.1:9");

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .geocode_oneline(&cancel, "100 Main St")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
