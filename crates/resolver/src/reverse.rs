//! Coordinates to address via the spatial database.
//!
//! There is no fallback chain here, so every failure is returned.

use std::sync::Arc;

use common::{run_cancellable, Error, ReverseResult};
use postgis_client::ReverseRow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument, Span};

use crate::spatial::SpatialBackend;

#[derive(Clone)]
pub struct ReverseResolver {
    backend: Arc<dyn SpatialBackend>,
    span: Span,
}

impl ReverseResolver {
    pub fn new(backend: Arc<dyn SpatialBackend>) -> Self {
        Self {
            backend,
            span: tracing::info_span!("reverse_geocoder"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn reverse_geocode(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lng: f64,
    ) -> Result<ReverseResult, Error> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(Error::InvalidCoordinates { lat, lng });
        }

        let row = run_cancellable(cancel, self.backend.reverse_geocode(lat, lng))
            .instrument(self.span.clone())
            .await?;

        self.span.in_scope(|| match row {
            Some(row) => {
                debug!(lat, lng, "Reverse geocode hit");
                Ok(into_result(row))
            }
            None => {
                debug!(lat, lng, "Reverse geocode found nothing");
                Err(Error::ReverseNotFound { lat, lng })
            }
        })
    }
}

fn into_result(row: ReverseRow) -> ReverseResult {
    ReverseResult {
        street: row.street.unwrap_or_default(),
        city: row.city.unwrap_or_default(),
        state: row.state.unwrap_or_default(),
        zip_code: row.zip.unwrap_or_default(),
        county_fips: row.county_fips.unwrap_or_default(),
        rating: row.rating.unwrap_or(0),
    }
}
