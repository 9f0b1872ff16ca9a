//! Implementation of [`CertificateId`].

use crate::{UuidError, UuidResult};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Canonical certificate identifier (32 lowercase hex characters, no hyphens).
///
/// Once constructed, the contained UUID is guaranteed to be valid and is always displayed in
/// canonical form.
///
/// # Construction
/// - [`CertificateId::new`] generates a fresh identifier for a new certificate.
/// - [`CertificateId::parse`] validates an externally supplied identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CertificateId(Uuid);

impl Default for CertificateId {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateId {
    /// Generates a new random identifier (RFC 4122 version 4).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses an identifier that must already be in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not exactly 32 lowercase hex
    /// characters.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "certificate id must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(e.to_string()))
    }

    /// Returns the underlying `uuid::Uuid`.
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is in canonical form.
    ///
    /// Purely syntactic: exactly 32 bytes, each `0-9` or `a-f`.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Filename for an artifact of this certificate, e.g. `<id>.pdf`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self, extension)
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for CertificateId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CertificateId::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for CertificateId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CertificateId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CertificateId::parse(&s).map_err(serde::de::Error::custom)
    }
}
