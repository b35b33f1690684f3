//! # Decentralized Identifier
//!
//! Self-certifying agent identifier. The broker only routes for identifiers
//! in the `did:<method>:<id>` shape; key extraction for the `did:key` method
//! lives in the crypto crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from identifier validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DidError {
    /// The identifier does not match `did:<method>:<id>`.
    #[error("malformed DID: {0:?}")]
    Malformed(String),
}

/// A validated decentralized identifier.
///
/// Stored as the full string form (`did:key:z6Mk...`). Ordering and equality
/// are byte-wise on the string, which makes the lexicographic committee
/// tie-break deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Validate and wrap a DID string.
    ///
    /// # Errors
    ///
    /// `DidError::Malformed` when the string is not `did:<method>:<id>` with
    /// a non-empty method and identifier part.
    pub fn parse(s: impl Into<String>) -> Result<Self, DidError> {
        let s = s.into();
        let mut parts = s.splitn(3, ':');
        let scheme = parts.next().unwrap_or_default();
        let method = parts.next().unwrap_or_default();
        let id = parts.next().unwrap_or_default();
        if scheme != "did" || method.is_empty() || id.is_empty() {
            return Err(DidError::Malformed(s));
        }
        Ok(Self(s))
    }

    /// The DID method (`key` for `did:key:...`).
    #[must_use]
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// The method-specific identifier (everything after the second colon).
    #[must_use]
    pub fn method_id(&self) -> &str {
        self.0.splitn(3, ':').nth(2).unwrap_or_default()
    }

    /// Full string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = DidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}
