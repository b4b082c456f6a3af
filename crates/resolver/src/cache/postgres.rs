//! Cache backed by a Postgres table.

use async_trait::async_trait;
use chrono::Utc;
use common::{CacheEntry, Error, GeocodeResult};
use postgis_client::{PostgisClient, TableName};

use super::CacheStore;

pub struct PgCacheStore {
    db: PostgisClient,
    table: TableName,
    ttl_days: u32,
}

impl PgCacheStore {
    /// Fails fast if `table` is not a safe `[schema.]table` identifier.
    pub fn new(db: PostgisClient, table: &str, ttl_days: u32) -> Result<Self, Error> {
        Ok(Self {
            db,
            table: TableName::parse(table)?,
            ttl_days,
        })
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn check(&self, key: &str) -> Result<Option<GeocodeResult>, Error> {
        let entry = self
            .db
            .fetch_cache_entry(&self.table, key, self.ttl_days)
            .await?;
        Ok(entry.map(CacheEntry::into_result))
    }

    async fn store(&self, key: &str, result: &GeocodeResult) -> Result<(), Error> {
        let entry = CacheEntry::from_result(key, result, Utc::now());
        self.db.upsert_cache_entry(&self.table, &entry).await
    }
}
