//! Domain types shared across the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

// ── Input ─────────────────────────────────────────────────────────────

/// One address to resolve, as delivered by the ingestion pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInput {
    /// Correlation tag for batch calls. Assigned positionally when empty.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, alias = "zip")]
    pub zip_code: String,
}

impl AddressInput {
    pub fn new(street: &str, city: &str, state: &str, zip_code: &str) -> Self {
        Self {
            id: String::new(),
            street: street.to_string(),
            city: city.to_string(),
            state: state.to_string(),
            zip_code: zip_code.to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// True when every address field is blank.
    pub fn is_blank(&self) -> bool {
        [&self.street, &self.city, &self.state, &self.zip_code]
            .iter()
            .all(|f| f.trim().is_empty())
    }
}

// ── Quality ───────────────────────────────────────────────────────────

/// Precision tier of a resolved point, most precise first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Rooftop,
    Range,
    Centroid,
    Approximate,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Rooftop => "rooftop",
            Quality::Range => "range",
            Quality::Centroid => "centroid",
            Quality::Approximate => "approximate",
        }
    }

    /// Map a TIGER match rating (0 = best) onto a precision tier.
    pub fn from_rating(rating: i32) -> Self {
        if rating < 10 {
            Quality::Rooftop
        } else if rating < 20 {
            Quality::Range
        } else if rating < 50 {
            Quality::Centroid
        } else {
            Quality::Approximate
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rooftop" => Ok(Quality::Rooftop),
            "range" => Ok(Quality::Range),
            "centroid" => Ok(Quality::Centroid),
            "approximate" => Ok(Quality::Approximate),
            other => Err(Error::Parse(format!("unknown quality '{other}'"))),
        }
    }
}

// ── Results ───────────────────────────────────────────────────────────

/// Outcome of one forward resolution. `matched == false` is a normal result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub latitude: f64,
    pub longitude: f64,
    /// Name of the backend that produced (or last failed to produce) the result.
    pub source: String,
    pub quality: Option<Quality>,
    pub matched: bool,
    pub rating: i32,
    #[serde(default)]
    pub county_fips: String,
}

impl GeocodeResult {
    pub fn unmatched(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }
}

/// Outcome of a coordinates → address lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseResult {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub county_fips: String,
    pub rating: i32,
}

// ── Cache ─────────────────────────────────────────────────────────────

/// A persisted resolution outcome keyed by address hash.
///
/// Negative entries carry `matched = false` and no coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub address_hash: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub quality: Option<String>,
    pub rating: Option<i32>,
    pub matched: bool,
    pub county_fips: Option<String>,
    pub source: String,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn from_result(address_hash: &str, result: &GeocodeResult, now: DateTime<Utc>) -> Self {
        let (latitude, longitude) = if result.matched {
            (Some(result.latitude), Some(result.longitude))
        } else {
            (None, None)
        };

        Self {
            address_hash: address_hash.to_string(),
            latitude,
            longitude,
            quality: result.quality.map(|q| q.as_str().to_string()),
            rating: Some(result.rating),
            matched: result.matched,
            county_fips: (!result.county_fips.is_empty()).then(|| result.county_fips.clone()),
            source: result.source.clone(),
            cached_at: now,
        }
    }

    /// True if the entry is still usable. `ttl_days == 0` never expires.
    pub fn is_fresh(&self, ttl_days: u32, now: DateTime<Utc>) -> bool {
        ttl_days == 0 || now - self.cached_at < Duration::days(i64::from(ttl_days))
    }

    pub fn into_result(self) -> GeocodeResult {
        GeocodeResult {
            latitude: self.latitude.unwrap_or_default(),
            longitude: self.longitude.unwrap_or_default(),
            source: self.source,
            quality: self.quality.as_deref().and_then(|q| q.parse().ok()),
            matched: self.matched,
            rating: self.rating.unwrap_or_default(),
            county_fips: self.county_fips.unwrap_or_default(),
        }
    }
}
