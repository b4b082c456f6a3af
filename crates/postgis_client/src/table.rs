//! Validated SQL identifiers.
//!
//! Table names come from configuration and are spliced into SQL text, so
//! anything that is not a plain `[schema.]table` identifier is rejected
//! when the store is built.

use std::fmt;

use common::Error;

const MAX_IDENT_LEN: usize = 63;

/// A `[schema.]table` name safe to interpolate into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('.').collect();

        if parts.is_empty() || parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
            return Err(Error::Config(format!(
                "invalid table name '{raw}': expected [schema.]table with letters, digits and underscores"
            )));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= MAX_IDENT_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
