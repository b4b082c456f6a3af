//! Backend capability contracts.
//!
//! Every backend implements [`Provider`]. Batch submission is a second,
//! explicitly checked capability exposed through [`Provider::bulk`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use common::{AddressInput, Error, GeocodeResult};
use tokio_util::sync::CancellationToken;

/// A forward geocoding backend.
///
/// `Ok` with `matched == false` is a normal "no result"; `Err` means the
/// backend itself failed (network, database, parse).
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// False when the backend is missing what it needs to run.
    fn available(&self) -> bool {
        true
    }

    /// Outbound calls must give up with `Error::Cancelled` once `cancel` fires.
    async fn geocode(
        &self,
        cancel: &CancellationToken,
        addr: &AddressInput,
    ) -> Result<GeocodeResult, Error>;

    /// Batch-submission capability, if this backend has one.
    fn bulk(&self) -> Option<&dyn BulkProvider> {
        None
    }
}

/// Batch submission of many addresses in one request.
#[async_trait]
pub trait BulkProvider: Send + Sync {
    /// Largest batch a single call accepts.
    fn max_batch_size(&self) -> usize;

    /// Resolve `addrs`, keyed by `AddressInput::id`.
    ///
    /// Ids missing from the returned map were not answered by the backend.
    async fn geocode_bulk(
        &self,
        cancel: &CancellationToken,
        addrs: &[AddressInput],
    ) -> Result<HashMap<String, GeocodeResult>, Error>;
}

/// The backends the cascade knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Tiger,
    Census,
    Google,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Tiger => "tiger",
            ProviderKind::Census => "census",
            ProviderKind::Google => "google",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiger" => Ok(ProviderKind::Tiger),
            "census" => Ok(ProviderKind::Census),
            "google" => Ok(ProviderKind::Google),
            other => Err(Error::Config(format!(
                "unknown provider '{other}' (expected tiger, census or google)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_names() {
        assert_eq!("tiger".parse::<ProviderKind>().unwrap(), ProviderKind::Tiger);
        assert_eq!(" Census ".parse::<ProviderKind>().unwrap(), ProviderKind::Census);
        assert_eq!("GOOGLE".parse::<ProviderKind>().unwrap(), ProviderKind::Google);

        let err = "bing".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
