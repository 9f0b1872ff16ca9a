//! Certificate identifiers.
//!
//! Every certificate is keyed by a [`CertificateId`]: a random (version 4) UUID rendered in a
//! *canonical* form of **32 lowercase hexadecimal characters** (no hyphens). The same string is
//! the filename stem of the generated artifacts (`<id>.pdf`, `<id>.png`), the ledger key, and the
//! last path segment of the public verification URL.
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Notes:
//! - This is the same value you would get from `Uuid::new_v4().simple().to_string()`.
//! - Identifiers arriving from outside (URL path segments, CLI arguments) must already be
//!   canonical. Use [`CertificateId::parse`] to validate them; hyphenated or uppercase forms are
//!   rejected rather than normalised, so a certificate has exactly one valid URL.
//!
//! ## Uniqueness
//! 122 random bits per identifier make collisions negligible without any shared counter, so
//! concurrent submissions allocate identifiers without coordinating with each other.

mod service;

pub use service::{CertificateId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
