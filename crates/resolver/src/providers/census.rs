//! Free Census Bureau geocoder, single and batch.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use census_client::{BulkMatch, BulkRecord, CensusClient, CensusMatch, MAX_BATCH_ROWS};
use common::{AddressInput, Error, GeocodeResult, Quality};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::normalize::format_one_line;
use crate::provider::{BulkProvider, Provider, ProviderKind};

pub struct CensusProvider {
    client: CensusClient,
    bulk_enabled: bool,
}

impl CensusProvider {
    pub fn new(client: CensusClient) -> Self {
        Self {
            client,
            bulk_enabled: true,
        }
    }

    pub fn with_bulk(mut self, enabled: bool) -> Self {
        self.bulk_enabled = enabled;
        self
    }
}

fn quality_for(exact: bool) -> Quality {
    if exact {
        Quality::Rooftop
    } else {
        Quality::Range
    }
}

fn result_from_match(m: CensusMatch) -> GeocodeResult {
    GeocodeResult {
        latitude: m.latitude,
        longitude: m.longitude,
        source: ProviderKind::Census.as_str().to_string(),
        quality: Some(quality_for(m.exact)),
        matched: true,
        rating: 0,
        county_fips: m.county_fips.unwrap_or_default(),
    }
}

fn result_from_bulk(m: BulkMatch) -> GeocodeResult {
    if !m.matched {
        return GeocodeResult::unmatched(ProviderKind::Census.as_str());
    }
    GeocodeResult {
        latitude: m.latitude,
        longitude: m.longitude,
        source: ProviderKind::Census.as_str().to_string(),
        quality: Some(quality_for(m.exact)),
        matched: true,
        rating: 0,
        county_fips: m.county_fips.unwrap_or_default(),
    }
}

/// Correlate response rows back to the submitted ids, dropping strays.
fn correlate(requested: &HashSet<&str>, rows: Vec<BulkMatch>) -> HashMap<String, GeocodeResult> {
    let mut out = HashMap::with_capacity(rows.len());
    for row in rows {
        if !requested.contains(row.id.as_str()) {
            debug!(id = %row.id, "Dropping Census batch row with unknown id");
            continue;
        }
        out.insert(row.id.clone(), result_from_bulk(row));
    }
    out
}

#[async_trait]
impl Provider for CensusProvider {
    fn name(&self) -> &str {
        ProviderKind::Census.as_str()
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

        Ok(match self.client.geocode_oneline(cancel, &one_line).await? {
            Some(m) => result_from_match(m),
            None => GeocodeResult::unmatched(self.name()),
        })
    }

    fn bulk(&self) -> Option<&dyn BulkProvider> {
        if self.bulk_enabled {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl BulkProvider for CensusProvider {
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_ROWS
    }

    async fn geocode_bulk(
        &self,
        cancel: &CancellationToken,
        addrs: &[AddressInput],
    ) -> Result<HashMap<String, GeocodeResult>, Error> {
        let mut answers = HashMap::new();
        let mut records = Vec::with_capacity(addrs.len());

        for addr in addrs {
            if addr.is_blank() {
                answers.insert(addr.id.clone(), GeocodeResult::unmatched(self.name()));
                continue;
            }
            records.push(BulkRecord {
                id: addr.id.clone(),
                street: addr.street.trim().to_string(),
                city: addr.city.trim().to_string(),
                state: addr.state.trim().to_string(),
                zip: addr.zip_code.trim().to_string(),
            });
        }

        let requested: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let rows = self.client.geocode_batch(cancel, &records).await?;
        answers.extend(correlate(&requested, rows));

        Ok(answers)
    }
}
