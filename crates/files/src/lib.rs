//! TrialCert artifact storage
//!
//! This crate stores the two artifacts produced for every certificate (the PDF and its QR
//! image) and computes the content hashes the integrity ledger relies on.
//!
//! ## Design Principles
//!
//! - Artifacts are keyed by certificate id; writes for distinct ids never touch the same file
//! - Artifacts are immutable once written (an existing file is never overwritten)
//! - A write is complete only after the bytes are synced and atomically renamed into place, so
//!   readers never observe a half-written certificate
//! - Storage is reached through the [`ArtifactStore`] trait so the backend can be swapped
//!
//! ## Storage Layout
//!
//! ```text
//! <certs_dir>/
//! ├── 550e8400e29b41d4a716446655440000.pdf
//! └── 550e8400e29b41d4a716446655440000.png
//! ```
//!
//! Both files are served publicly under [`PUBLIC_PREFIX`] (`/certs/<id>.pdf`).
//!
//! ## Example Usage
//!
//! ```no_run
//! use trialcert_files::{ArtifactKind, ArtifactStore, LocalArtifactStore};
//! use trialcert_uuid::CertificateId;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LocalArtifactStore::new(Path::new("certs"))?;
//! let id = CertificateId::new();
//! let stored = store.write(&id, ArtifactKind::Pdf, b"%PDF-1.3 ...")?;
//! println!("{} -> {}", stored.public_path, stored.hash);
//! # Ok(())
//! # }
//! ```

mod constants;
mod files;
mod media;

pub use constants::{PUBLIC_PREFIX, TEMP_SUFFIX};
pub use files::{
    hash_bytes, hash_file, ArtifactKind, ArtifactStore, LocalArtifactStore, StoredArtifact,
};
pub use media::{sniff_image, ImageMediaType};
pub use trialcert_uuid::CertificateId;

/// Errors that can occur during artifact operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Artifact already exists in storage (immutability violation)
    #[error("Artifact already exists: {0}")]
    ArtifactAlreadyExists(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
