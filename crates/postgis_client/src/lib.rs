//! PostGIS / TIGER geocoder access.
//!
//! Wraps the database-side `geocode()` and `reverse_geocode()` functions
//! plus the result cache table. One `tokio_postgres::Client` is shared by
//! every worker; it pipelines concurrent queries over its connection.

pub mod cache;
pub mod table;

use std::sync::Arc;

use common::Error;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, error, info};

pub use table::TableName;

const GEOCODE_SQL: &str = "\
SELECT ST_Y(g.geomout)::float8 AS latitude,
       ST_X(g.geomout)::float8 AS longitude,
       g.rating::int4 AS rating,
       pprint_addy(g.addy) AS matched_address,
       (SELECT c.statefp || c.countyfp
          FROM tiger.county c
         WHERE ST_Intersects(c.the_geom, g.geomout)
         LIMIT 1) AS county_fips
  FROM geocode($1, $2) AS g
 ORDER BY g.rating
 LIMIT 1";

const REVERSE_SQL: &str = "\
SELECT concat_ws(' ', (r.addy[1]).address::text, (r.addy[1]).predirabbrev,
                 (r.addy[1]).streetname, (r.addy[1]).streettypeabbrev,
                 (r.addy[1]).postdirabbrev) AS street,
       (r.addy[1]).location AS city,
       (r.addy[1]).stateabbrev AS state,
       (r.addy[1]).zip AS zip,
       (SELECT c.statefp || c.countyfp
          FROM tiger.county c
         WHERE ST_Intersects(c.the_geom, r.intpt)
         LIMIT 1) AS county_fips,
       NULL::int4 AS rating
  FROM reverse_geocode(ST_SetSRID(ST_MakePoint($2, $1), 4269), $3) AS r
 LIMIT 1";

/// Best candidate from the TIGER `geocode()` function.
#[derive(Debug, Clone, PartialEq)]
pub struct TigerRow {
    pub latitude: f64,
    pub longitude: f64,
    /// 0 is a perfect match; larger is worse.
    pub rating: i32,
    pub matched_address: Option<String>,
    pub county_fips: Option<String>,
}

/// Row from the TIGER `reverse_geocode()` function. Every column is nullable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReverseRow {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub county_fips: Option<String>,
    pub rating: Option<i32>,
}

/// Shared handle to the spatial database.
#[derive(Clone)]
pub struct PostgisClient {
    client: Arc<tokio_postgres::Client>,
}

impl std::fmt::Debug for PostgisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgisClient")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl PostgisClient {
    /// Connect and spawn the connection driver on the current runtime.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| Error::Database(format!("connect failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Postgres connection closed with error: {}", e);
            }
        });

        info!("Connected to spatial database");
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: tokio_postgres::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub(crate) fn inner(&self) -> &tokio_postgres::Client {
        &self.client
    }

    /// Run `geocode(address, max_results)` and keep the best-rated row.
    pub async fn geocode(
        &self,
        one_line: &str,
        max_results: i32,
    ) -> Result<Option<TigerRow>, Error> {
        let row = self
            .client
            .query_opt(GEOCODE_SQL, &[&one_line, &max_results])
            .await
            .map_err(|e| Error::Database(format!("geocode() failed: {e}")))?;

        debug!("TIGER geocode returned {}", if row.is_some() { "a row" } else { "no rows" });

        row.map(|r| tiger_row(&r)).transpose()
    }

    /// Run `reverse_geocode(point)` for a WGS84-ish lat/lng.
    pub async fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<ReverseRow>, Error> {
        let include_ranges = true;
        let row = self
            .client
            .query_opt(REVERSE_SQL, &[&lat, &lng, &include_ranges])
            .await
            .map_err(|e| Error::Database(format!("reverse_geocode() failed: {e}")))?;

        row.map(|r| reverse_row(&r)).transpose()
    }
}

fn tiger_row(row: &Row) -> Result<TigerRow, Error> {
    Ok(TigerRow {
        latitude: column(row, "latitude")?,
        longitude: column(row, "longitude")?,
        rating: column(row, "rating")?,
        matched_address: column(row, "matched_address")?,
        county_fips: column(row, "county_fips")?,
    })
}

fn reverse_row(row: &Row) -> Result<ReverseRow, Error> {
    Ok(ReverseRow {
        street: column(row, "street")?,
        city: column(row, "city")?,
        state: column(row, "state")?,
        zip: column(row, "zip")?,
        county_fips: column(row, "county_fips")?,
        rating: column(row, "rating")?,
    })
}

pub(crate) fn column<'a, T>(row: &'a Row, name: &str) -> Result<T, Error>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name)
        .map_err(|e| Error::Database(format!("column {name}: {e}")))
}
