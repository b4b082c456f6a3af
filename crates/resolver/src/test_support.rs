//! Stub backends for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{AddressInput, Error, GeocodeResult, Quality};
use postgis_client::{ReverseRow, TigerRow};
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::provider::{BulkProvider, Provider};
use crate::spatial::SpatialBackend;

pub fn matched(source: &str, lat: f64, lng: f64) -> GeocodeResult {
    GeocodeResult {
        latitude: lat,
        longitude: lng,
        source: source.to_string(),
        quality: Some(Quality::Rooftop),
        matched: true,
        rating: 0,
        county_fips: String::new(),
    }
}

#[derive(Clone)]
pub enum Behavior {
    Match,
    NoMatch,
    Fail,
    NotConfigured,
    /// Fails the test if the cascade ever reaches this provider.
    MustNotBeCalled,
    /// Matches only streets containing the given text.
    MatchStreet(&'static str),
}

pub struct StubProvider {
    name: String,
    behavior: Behavior,
    available: bool,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StubProvider {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            available: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        self.available
    }

    async fn geocode(
        &self,
        _cancel: &CancellationToken,
        addr: &AddressInput,
    ) -> Result<GeocodeResult, Error> {
        if matches!(self.behavior, Behavior::MustNotBeCalled) {
            panic!("provider {} must not be called", self.name);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Match => Ok(matched(&self.name, 25.77, -80.19)),
            Behavior::NoMatch => Ok(GeocodeResult::unmatched(&self.name)),
            Behavior::Fail => Err(Error::Http(format!("{} is down", self.name))),
            Behavior::NotConfigured => Err(Error::NotConfigured(self.name.clone())),
            Behavior::MatchStreet(needle) if addr.street.contains(needle) => {
                Ok(matched(&self.name, 25.77, -80.19))
            }
            Behavior::MatchStreet(_) => Ok(GeocodeResult::unmatched(&self.name)),
            Behavior::MustNotBeCalled => unreachable!(),
        }
    }
}

/// Bulk-capable stub that matches streets containing `needle` and drops
/// ids listed in `drop_ids` from its answers.
pub struct StubBulkProvider {
    pub inner: StubProvider,
    pub needle: &'static str,
    pub drop_ids: Vec<String>,
    pub fail: bool,
    pub bulk_calls: AtomicUsize,
    pub submitted: Mutex<Vec<String>>,
}

impl StubBulkProvider {
    pub fn new(name: &str, needle: &'static str) -> Self {
        Self {
            inner: StubProvider::new(name, Behavior::MatchStreet(needle)),
            needle,
            drop_ids: Vec::new(),
            fail: false,
            bulk_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Provider for StubBulkProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn geocode(
        &self,
        cancel: &CancellationToken,
        addr: &AddressInput,
    ) -> Result<GeocodeResult, Error> {
        self.inner.geocode(cancel, addr).await
    }

    fn bulk(&self) -> Option<&dyn BulkProvider> {
        Some(self)
    }
}

#[async_trait]
impl BulkProvider for StubBulkProvider {
    fn max_batch_size(&self) -> usize {
        2
    }

    async fn geocode_bulk(
        &self,
        _cancel: &CancellationToken,
        addrs: &[AddressInput],
    ) -> Result<HashMap<String, GeocodeResult>, Error> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.extend(addrs.iter().map(|a| a.id.clone()));
        }
        if self.fail {
            return Err(Error::Census("batch endpoint unavailable".into()));
        }

        Ok(addrs
            .iter()
            .filter(|a| !self.drop_ids.contains(&a.id))
            .map(|a| {
                let result = if a.street.contains(self.needle) {
                    matched(self.inner.name(), 30.0, -90.0)
                } else {
                    GeocodeResult::unmatched(self.inner.name())
                };
                (a.id.clone(), result)
            })
            .collect())
    }
}

/// Cache whose reads and writes always fail.
pub struct BrokenCache;

#[async_trait]
impl CacheStore for BrokenCache {
    async fn check(&self, _key: &str) -> Result<Option<GeocodeResult>, Error> {
        Err(Error::Database("connection refused".into()))
    }

    async fn store(&self, _key: &str, _result: &GeocodeResult) -> Result<(), Error> {
        Err(Error::Database("connection refused".into()))
    }
}

/// Canned spatial backend that records how often it was queried.
#[derive(Default)]
pub struct StubSpatial {
    pub tiger: Option<TigerRow>,
    pub reverse: Option<ReverseRow>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StubSpatial {
    pub fn with_rating(rating: i32) -> Self {
        Self {
            tiger: Some(TigerRow {
                latitude: 25.7741,
                longitude: -80.1872,
                rating,
                matched_address: Some("100 S Biscayne Blvd, Miami, FL 33131".into()),
                county_fips: Some("12086".into()),
            }),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpatialBackend for StubSpatial {
    async fn geocode(&self, _one_line: &str, _max_results: i32) -> Result<Option<TigerRow>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Database("geocode() failed".into()));
        }
        Ok(self.tiger.clone())
    }

    async fn reverse_geocode(&self, _lat: f64, _lng: f64) -> Result<Option<ReverseRow>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Database("reverse_geocode() failed".into()));
        }
        Ok(self.reverse.clone())
    }
}
