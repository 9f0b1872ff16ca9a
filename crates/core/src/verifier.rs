//! Public verification of issued certificates.
//!
//! Verification looks the record up, re-hashes the PDF currently in storage and compares the
//! two. It never writes anything. Record signatures are checked against the site's trust
//! anchor, not against the key embedded in the record.

use p256::ecdsa::VerifyingKey;
use serde::Serialize;
use std::sync::Arc;
use trialcert_files::{hash_bytes, ArtifactKind, ArtifactStore};
use trialcert_types::ContentHash;
use trialcert_uuid::CertificateId;

use crate::ledger::{CertificationRecord, Ledger};
use crate::signing::{verify_record_signature, SignatureStatus};
use crate::{CertError, CertResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Stored PDF hashes to the recorded value.
    Valid,
    /// Stored PDF differs from what was certified.
    Altered,
    /// No record for this id.
    NotFound,
    /// Record exists but its PDF is gone.
    ArtifactMissing,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Valid => "valid",
            VerificationStatus::Altered => "altered",
            VerificationStatus::NotFound => "not_found",
            VerificationStatus::ArtifactMissing => "artifact_missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub record: Option<CertificationRecord>,
    pub current_hash: Option<ContentHash>,
    pub signature: SignatureStatus,
}

impl VerificationResult {
    fn not_found() -> Self {
        Self {
            status: VerificationStatus::NotFound,
            record: None,
            current_hash: None,
            signature: SignatureStatus::Unsigned,
        }
    }
}

pub struct Verifier {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ArtifactStore>,
    trusted: Option<VerifyingKey>,
}

impl Verifier {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            ledger,
            store,
            trusted: None,
        }
    }

    /// Site key that record signatures must come from.
    pub fn with_trust_anchor(mut self, trusted: Option<VerifyingKey>) -> Self {
        self.trusted = trusted;
        self
    }

    /// Verifies the certificate with the given public id.
    ///
    /// A malformed id is reported as `NotFound` rather than an error: the id arrives from a URL
    /// anyone can type.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures (ledger lock, storage read) are errors.
    pub fn verify(&self, id: &str) -> CertResult<VerificationResult> {
        let Ok(id) = CertificateId::parse(id) else {
            return Ok(VerificationResult::not_found());
        };
        let Some(record) = self.ledger.find_by_id(&id)? else {
            return Ok(VerificationResult::not_found());
        };

        let signature = verify_record_signature(&record, self.trusted.as_ref());
        let current = self
            .store
            .read(&id, ArtifactKind::Pdf)
            .map_err(CertError::StorageReadFailed)?;

        let Some(bytes) = current else {
            tracing::warn!(id = %id, "certified PDF is missing from storage");
            return Ok(VerificationResult {
                status: VerificationStatus::ArtifactMissing,
                record: Some(record),
                current_hash: None,
                signature,
            });
        };

        let current_hash = hash_bytes(&bytes);
        let status = if current_hash == record.content_hash {
            VerificationStatus::Valid
        } else {
            tracing::warn!(id = %id, stored = %record.content_hash, current = %current_hash, "certificate content altered");
            VerificationStatus::Altered
        };

        Ok(VerificationResult {
            status,
            record: Some(record),
            current_hash: Some(current_hash),
            signature,
        })
    }
}
