//! Address resolution engine.
//!
//! A cascade of geocoding backends behind a positive/negative result
//! cache, with bounded-concurrency batch fan-out and a reverse lookup.

pub mod batch;
pub mod cache;
pub mod cascade;
pub mod normalize;
pub mod provider;
pub mod providers;
pub mod reverse;
pub mod setup;
pub mod spatial;

#[cfg(test)]
mod test_support;

pub use cache::{CacheStore, MemoryCacheStore, PgCacheStore};
pub use cascade::Geocoder;
pub use provider::{BulkProvider, Provider, ProviderKind};
pub use providers::{CensusProvider, GoogleProvider, TigerProvider};
pub use reverse::ReverseResolver;
pub use setup::{build_geocoder, build_reverse_resolver};
pub use spatial::SpatialBackend;
