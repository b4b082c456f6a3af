//! Seam over the database-side spatial functions.

use async_trait::async_trait;
use common::Error;
use postgis_client::{PostgisClient, ReverseRow, TigerRow};

/// The TIGER `geocode` / `reverse_geocode` functions.
#[async_trait]
pub trait SpatialBackend: Send + Sync {
    async fn geocode(&self, one_line: &str, max_results: i32) -> Result<Option<TigerRow>, Error>;

    async fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<ReverseRow>, Error>;
}

#[async_trait]
impl SpatialBackend for PostgisClient {
    async fn geocode(&self, one_line: &str, max_results: i32) -> Result<Option<TigerRow>, Error> {
        PostgisClient::geocode(self, one_line, max_results).await
    }

    async fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<ReverseRow>, Error> {
        PostgisClient::reverse_geocode(self, lat, lng).await
    }
}
