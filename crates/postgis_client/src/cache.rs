//! Geocode cache table access.
//!
//! Expected shape:
//!
//! ```sql
//! CREATE TABLE public.geocode_cache (
//!     address_hash text PRIMARY KEY,
//!     latitude     double precision,
//!     longitude    double precision,
//!     quality      text,
//!     rating       integer,
//!     matched      boolean NOT NULL DEFAULT false,
//!     county_fips  text,
//!     source       text NOT NULL DEFAULT '',
//!     cached_at    timestamptz NOT NULL DEFAULT now()
//! );
//! ```

use chrono::{DateTime, Utc};
use common::{CacheEntry, Error};

use crate::{column, PostgisClient, TableName};

impl PostgisClient {
    /// Fetch the entry for `address_hash` if it is inside the TTL window.
    ///
    /// `Ok(None)` covers both "never stored" and "stored but stale"; stale
    /// rows are left in place for the next upsert to overwrite.
    pub async fn fetch_cache_entry(
        &self,
        table: &TableName,
        address_hash: &str,
        ttl_days: u32,
    ) -> Result<Option<CacheEntry>, Error> {
        let sql = format!(
            "SELECT address_hash, latitude, longitude, quality, rating, matched, \
                    county_fips, source, cached_at \
               FROM {table} \
              WHERE address_hash = $1 \
                AND ($2::int4 = 0 OR cached_at > now() - make_interval(days => $2::int4))"
        );
        let ttl = i32::try_from(ttl_days).unwrap_or(i32::MAX);

        let row = self
            .inner()
            .query_opt(sql.as_str(), &[&address_hash, &ttl])
            .await
            .map_err(|e| Error::Database(format!("cache lookup on {table} failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let cached_at: DateTime<Utc> = column(&row, "cached_at")?;
        Ok(Some(CacheEntry {
            address_hash: column(&row, "address_hash")?,
            latitude: column(&row, "latitude")?,
            longitude: column(&row, "longitude")?,
            quality: column(&row, "quality")?,
            rating: column(&row, "rating")?,
            matched: column(&row, "matched")?,
            county_fips: column(&row, "county_fips")?,
            source: column::<Option<String>>(&row, "source")?.unwrap_or_default(),
            cached_at,
        }))
    }

    /// Insert or fully replace the entry for `entry.address_hash`.
    pub async fn upsert_cache_entry(&self, table: &TableName, entry: &CacheEntry) -> Result<(), Error> {
        let sql = format!(
            "INSERT INTO {table} \
                 (address_hash, latitude, longitude, quality, rating, matched, county_fips, source, cached_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (address_hash) DO UPDATE SET \
                 latitude = EXCLUDED.latitude, \
                 longitude = EXCLUDED.longitude, \
                 quality = EXCLUDED.quality, \
                 rating = EXCLUDED.rating, \
                 matched = EXCLUDED.matched, \
                 county_fips = EXCLUDED.county_fips, \
                 source = EXCLUDED.source, \
                 cached_at = EXCLUDED.cached_at"
        );

        self.inner()
            .execute(
                sql.as_str(),
                &[
                    &entry.address_hash,
                    &entry.latitude,
                    &entry.longitude,
                    &entry.quality,
                    &entry.rating,
                    &entry.matched,
                    &entry.county_fips,
                    &entry.source,
                    &entry.cached_at,
                ],
            )
            .await
            .map_err(|e| Error::Database(format!("cache upsert on {table} failed: {e}")))?;

        Ok(())
    }
}
