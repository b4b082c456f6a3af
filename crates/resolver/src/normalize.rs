//! Address canonicalisation: cache keys and one-line renderings.

use common::AddressInput;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of the canonical address.
///
/// Street, city and state are trimmed and lower-cased; the ZIP is used
/// verbatim. Each field is length-prefixed so no two distinct field
/// tuples share a canonical form.
pub fn cache_key(addr: &AddressInput) -> String {
    let canonical: String = [
        addr.street.trim().to_lowercase(),
        addr.city.trim().to_lowercase(),
        addr.state.trim().to_lowercase(),
        addr.zip_code.clone(),
    ]
    .iter()
    .map(|field| format!("{}:{}", field.len(), field))
    .collect();

    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// `"street, city, state, zip"` with blank fields left out.
pub fn format_one_line(addr: &AddressInput) -> String {
    [&addr.street, &addr.city, &addr.state, &addr.zip_code]
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// First characters of a key, for log lines.
pub(crate) fn short_key(key: &str) -> &str {
    &key[..key.len().min(12)]
}
