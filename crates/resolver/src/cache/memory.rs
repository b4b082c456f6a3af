//! In-process cache.
//!
//! Used when no database is configured. `DashMap` keeps concurrent batch
//! workers off a single lock.

use async_trait::async_trait;
use chrono::Utc;
use common::{CacheEntry, Error, GeocodeResult};
use dashmap::DashMap;

use super::CacheStore;

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
    ttl_days: u32,
}

impl MemoryCacheStore {
    pub fn new(ttl_days: u32) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_days,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw stored entry, fresh or not.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Overwrite an entry as-is (timestamps included).
    pub fn insert_entry(&self, entry: CacheEntry) {
        self.entries.insert(entry.address_hash.clone(), entry);
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn check(&self, key: &str) -> Result<Option<GeocodeResult>, Error> {
        let now = Utc::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.is_fresh(self.ttl_days, now))
            .map(|e| e.value().clone().into_result()))
    }

    async fn store(&self, key: &str, result: &GeocodeResult) -> Result<(), Error> {
        self.insert_entry(CacheEntry::from_result(key, result, Utc::now()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::matched;
    use chrono::Duration;

    #[tokio::test]
    async fn test_store_then_check_positive_and_negative() {
        let cache = MemoryCacheStore::new(0);

        cache.store("pos", &matched("tiger", 1.0, 2.0)).await.unwrap();
        cache
            .store("neg", &GeocodeResult::unmatched("google"))
            .await
            .unwrap();

        let pos = cache.check("pos").await.unwrap().unwrap();
        assert!(pos.matched);
        assert_eq!((pos.latitude, pos.longitude), (1.0, 2.0));

        let neg = cache.check("neg").await.unwrap().unwrap();
        assert!(!neg.matched);
        assert_eq!(neg.source, "google");

        assert!(cache.check("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_overwrites_whole_entry() {
        let cache = MemoryCacheStore::new(0);
        let mut first = matched("census", 1.0, 2.0);
        first.county_fips = "12086".into();
        cache.store("k", &first).await.unwrap();
        cache.store("k", &GeocodeResult::unmatched("google")).await.unwrap();

        let entry = cache.entry("k").unwrap();
        assert_eq!(cache.len(), 1);
        assert!(!entry.matched);
        assert_eq!(entry.latitude, None);
        assert_eq!(entry.county_fips, None);
        assert_eq!(entry.source, "google");
    }

    #[tokio::test]
    async fn test_stale_entry_is_miss_but_not_removed() {
        let cache = MemoryCacheStore::new(7);
        cache.store("k", &matched("tiger", 1.0, 2.0)).await.unwrap();

        let mut entry = cache.entry("k").unwrap();
        entry.cached_at = Utc::now() - Duration::days(8);
        cache.insert_entry(entry);

        assert!(cache.check("k").await.unwrap().is_none());
        assert_eq!(cache.len(), 1);
    }
}
