//! Identity tokens linking snapshots of the same origin instance.
//!
//! The recorder writes the origin runtime's identity hash as a JSON number,
//! but older traces and hand-written fixtures use strings. Both decode to the
//! same token.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque correlator for one origin-runtime instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Create a token from its textual form
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Get the textual form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tokens recorded as `0` or empty text mean "no identity"
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.is_empty() || self.0 == "0"
    }
}

impl From<u64> for IdentityToken {
    fn from(raw: u64) -> Self {
        Self(raw.to_string())
    }
}

impl From<&str> for IdentityToken {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl std::fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl Serialize for IdentityToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawToken {
    Int(i64),
    Uint(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for IdentityToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawToken::deserialize(deserializer)? {
            RawToken::Int(v) => Self(v.to_string()),
            RawToken::Uint(v) => Self(v.to_string()),
            RawToken::Text(v) => Self(v),
        })
    }
}
