//! Positive and negative result cache.
//!
//! Entries are keyed by the address hash and fully replaced on every
//! store. Expiry is lazy: a stale entry reads as a miss and stays put
//! until the next store overwrites it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use common::{Error, GeocodeResult};

pub use memory::MemoryCacheStore;
pub use postgres::PgCacheStore;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` when there is no usable entry; `Err` only for storage failures.
    async fn check(&self, key: &str) -> Result<Option<GeocodeResult>, Error>;

    /// Upsert `result` under `key`, overwriting any previous entry.
    async fn store(&self, key: &str, result: &GeocodeResult) -> Result<(), Error>;
}
