//! Validated value types shared across the TrialCert crates.
//!
//! - [`ContentHash`]: a SHA-256 digest in canonical form (64 lowercase hex characters).

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when parsing a content hash.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    #[error("content hash must be 64 lowercase hex characters, got {0} characters")]
    InvalidLength(usize),
    #[error("content hash contains non-hex or uppercase characters")]
    InvalidCharacters,
}

/// SHA-256 digest of a certificate's bytes, in canonical lowercase hex.
///
/// Two hashes compare equal only if they were computed over identical bytes, which is the whole
/// basis of tamper detection. Construction from raw digest bytes is infallible; parsing from
/// text rejects anything that is not exactly 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps a raw 32-byte digest.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Parses a stored hash, requiring canonical form.
    pub fn parse(input: &str) -> Result<Self, HashError> {
        if input.len() != 64 {
            return Err(HashError::InvalidLength(input.len()));
        }
        if !input
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(HashError::InvalidCharacters);
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentHash::parse(s)
    }
}

impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ContentHash::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_from_bytes_is_lowercase_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x0f;
        let hash = ContentHash::from_bytes(&bytes);

        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().starts_with("ab00"));
        assert!(hash.as_str().ends_with("0f"));
    }

    #[test]
    fn content_hash_parse_rejects_uppercase() {
        let upper = "AB".repeat(32);
        assert_eq!(
            ContentHash::parse(&upper),
            Err(HashError::InvalidCharacters)
        );
    }

    #[test]
    fn content_hash_parse_rejects_wrong_length() {
        assert_eq!(ContentHash::parse("abcd"), Err(HashError::InvalidLength(4)));
    }

    #[test]
    fn content_hash_deserialize_validates() {
        let ok: Result<ContentHash, _> = serde_json::from_str(&format!("\"{}\"", "0".repeat(64)));
        assert!(ok.is_ok());

        let bad: Result<ContentHash, _> = serde_json::from_str("\"not-a-hash\"");
        assert!(bad.is_err());
    }
}
