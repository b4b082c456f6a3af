//! Concrete backends, cheapest first.

pub mod census;
pub mod google;
pub mod tiger;

pub use census::CensusProvider;
pub use google::GoogleProvider;
pub use tiger::TigerProvider;
