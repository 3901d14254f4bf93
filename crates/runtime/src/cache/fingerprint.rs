use quarry_sql::CompiledQuery;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const PREFIX: &str = "query:";

/// Cache key of a compiled query: `query:<sha256 hex>` over the SQL text and
/// its parameters in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(query: &CompiledQuery) -> Self {
        let mut hasher = Sha256::new();
        // Length-prefixed so parameter boundaries are unambiguous.
        hasher.update((query.sql.len() as u64).to_le_bytes());
        hasher.update(query.sql.as_bytes());
        for param in &query.params {
            hasher.update((param.len() as u64).to_le_bytes());
            hasher.update(param.as_bytes());
        }
        Self(format!("{}{:x}", PREFIX, hasher.finalize()))
    }

    /// Accepts only the rendered form produced by [`Fingerprint::of`].
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix(PREFIX)?;
        if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("Invalid fingerprint: {}", s))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> String {
        fp.0
    }
}
