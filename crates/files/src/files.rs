//! Artifact storage service implementation
//!
//! This module provides the [`ArtifactStore`] seam and its local filesystem implementation,
//! [`LocalArtifactStore`], together with the SHA-256 helpers used to compute content hashes.
//!
//! # Write protocol
//!
//! 1. Refuse if the final artifact path already exists (artifacts are immutable)
//! 2. Write the bytes to `.<file>.partial` (created exclusively) and `fsync` it
//! 3. Atomically rename the temporary file onto the final path
//! 4. `fsync` the containing directory so the rename itself is durable
//!
//! If any step fails the temporary file is removed and the error is returned; the final path
//! either holds the complete artifact or does not exist.

use crate::{FilesError, PUBLIC_PREFIX, TEMP_SUFFIX};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use trialcert_types::ContentHash;
use trialcert_uuid::CertificateId;

/// The two artifacts generated per certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Pdf,
    QrPng,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::QrPng => "png",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::QrPng => "image/png",
        }
    }
}

/// Metadata for an artifact that has been durably written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub kind: ArtifactKind,

    /// SHA-256 digest of the bytes written
    pub hash: ContentHash,

    /// Public URL path, e.g. `/certs/<id>.pdf`
    pub public_path: String,

    pub size_bytes: u64,

    /// UTC timestamp when the artifact was stored
    pub stored_at: DateTime<Utc>,
}

/// Storage backend for certificate artifacts.
///
/// Implementations must make `write` all-or-nothing: after an error, `read` for the same id and
/// kind returns `None`.
pub trait ArtifactStore: Send + Sync {
    /// Durably stores `bytes` as the `kind` artifact of certificate `id`.
    fn write(
        &self,
        id: &CertificateId,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> Result<StoredArtifact, FilesError>;

    /// Reads the current bytes of an artifact, or `None` if it does not exist.
    fn read(&self, id: &CertificateId, kind: ArtifactKind) -> Result<Option<Vec<u8>>, FilesError>;

    /// Removes an artifact. Removing a missing artifact is not an error.
    fn remove(&self, id: &CertificateId, kind: ArtifactKind) -> Result<(), FilesError>;

    /// Public URL path of an artifact.
    fn public_path(&self, id: &CertificateId, kind: ArtifactKind) -> String {
        format!("{}/{}", PUBLIC_PREFIX, id.file_name(kind.extension()))
    }
}

/// Computes the SHA-256 content hash of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    ContentHash::from_bytes(&digest)
}

/// Computes the SHA-256 content hash of a file, streaming its contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, FilesError> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let digest: [u8; 32] = hasher.finalize().into();
    Ok(ContentHash::from_bytes(&digest))
}

/// Filesystem-backed [`ArtifactStore`] writing flat `<id>.<ext>` files under one directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    /// Canonicalised artifact directory
    root_directory: PathBuf,
}

impl LocalArtifactStore {
    /// Opens an existing artifact directory.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if the directory does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> Result<Self, FilesError> {
        if !root_directory.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    /// Creates the artifact directory if needed, then opens it.
    pub fn open_or_create(root_directory: &Path) -> Result<Self, FilesError> {
        fs::create_dir_all(root_directory)?;
        Self::new(root_directory)
    }

    /// Returns the canonicalised artifact directory.
    #[must_use]
    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// Absolute path of an artifact on disk.
    #[must_use]
    pub fn artifact_path(&self, id: &CertificateId, kind: ArtifactKind) -> PathBuf {
        self.root_directory.join(id.file_name(kind.extension()))
    }

    fn temp_path(&self, id: &CertificateId, kind: ArtifactKind) -> PathBuf {
        self.root_directory.join(format!(
            ".{}.{}",
            id.file_name(kind.extension()),
            TEMP_SUFFIX
        ))
    }

    fn write_temp(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> io::Result<()> {
        fs::File::open(&self.root_directory)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> io::Result<()> {
        Ok(())
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn write(
        &self,
        id: &CertificateId,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> Result<StoredArtifact, FilesError> {
        let target = self.artifact_path(id, kind);
        if target.exists() {
            return Err(FilesError::ArtifactAlreadyExists(
                target.display().to_string(),
            ));
        }

        let temp = self.temp_path(id, kind);
        let written = Self::write_temp(&temp, bytes).and_then(|()| fs::rename(&temp, &target));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to write artifact {}: {}", target.display(), e),
            )));
        }

        self.sync_directory()?;

        Ok(StoredArtifact {
            kind,
            hash: hash_bytes(bytes),
            public_path: self.public_path(id, kind),
            size_bytes: bytes.len() as u64,
            stored_at: Utc::now(),
        })
    }

    fn read(&self, id: &CertificateId, kind: ArtifactKind) -> Result<Option<Vec<u8>>, FilesError> {
        let path = self.artifact_path(id, kind);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to read artifact {}: {}", path.display(), e),
            ))),
        }
    }

    fn remove(&self, id: &CertificateId, kind: ArtifactKind) -> Result<(), FilesError> {
        match fs::remove_file(self.artifact_path(id, kind)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FilesError::Io(e)),
        }
    }
}
