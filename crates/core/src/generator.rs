//! Certificate artifact generation.
//!
//! Turns one submission into a stored QR image and a stored PDF, and hashes the PDF as read
//! back from storage. Nothing is written to the ledger here; see [`crate::service`].

use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use trialcert_files::{hash_bytes, ArtifactKind, ArtifactStore, FilesError};
use trialcert_types::ContentHash;
use trialcert_uuid::CertificateId;

use crate::config::{verification_url, CoreConfig};
use crate::forms::{Derived, FormType, Submission};
use crate::render::{compose, CertificateContent, PdfRenderer, QrRenderer};
use crate::{CertError, CertResult};

/// Output of a successful generation, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCertificate {
    pub id: CertificateId,
    pub form: FormType,
    pub created_at: DateTime<Utc>,
    pub verification_url: String,
    pub pdf_ref: String,
    pub qr_ref: String,
    pub content_hash: ContentHash,
    pub derived: Derived,
    pub patient_code: String,
    pub patient_name: Option<String>,
}

pub struct ArtifactGenerator {
    config: Arc<CoreConfig>,
    store: Arc<dyn ArtifactStore>,
    pdf: Arc<dyn PdfRenderer>,
    qr: Arc<dyn QrRenderer>,
}

impl ArtifactGenerator {
    pub fn new(
        config: Arc<CoreConfig>,
        store: Arc<dyn ArtifactStore>,
        pdf: Arc<dyn PdfRenderer>,
        qr: Arc<dyn QrRenderer>,
    ) -> Self {
        Self {
            config,
            store,
            pdf,
            qr,
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Generates and stores the artifacts for one submission, linking the QR code to
    /// `<base_url>/verify/<id>`.
    ///
    /// The input is trusted: validation belongs to the form layer, and missing values render
    /// as placeholders. Either both artifacts exist afterwards or neither does.
    ///
    /// # Errors
    ///
    /// - `RenderFailed` if the QR code or PDF cannot be produced
    /// - `StorageWriteFailed` / `StorageReadFailed` if an artifact cannot be stored or read back
    pub fn generate(
        &self,
        submission: &Submission,
        base_url: &str,
    ) -> CertResult<GeneratedCertificate> {
        let id = CertificateId::new();
        let created_at = Utc::now().trunc_subsecs(3);
        let verification_url = verification_url(base_url, &id);

        let qr_png = self.qr.render_png(&verification_url)?;
        let qr = self
            .store
            .write(&id, ArtifactKind::QrPng, &qr_png)
            .map_err(CertError::StorageWriteFailed)?;

        let pdf_ref = match self.render_and_store_pdf(
            &id,
            created_at,
            &verification_url,
            submission,
            &qr_png,
        ) {
            Ok(pdf_ref) => pdf_ref,
            Err(e) => return Err(self.discard(&id, &[ArtifactKind::QrPng], e)),
        };

        // Hash what storage actually holds, not what was handed to it.
        let content_hash = match self.read_back_hash(&id) {
            Ok(hash) => hash,
            Err(e) => {
                return Err(self.discard(&id, &[ArtifactKind::Pdf, ArtifactKind::QrPng], e));
            }
        };

        tracing::info!(
            id = %id,
            form = %submission.form,
            hash = %content_hash,
            "certificate generated"
        );

        Ok(GeneratedCertificate {
            id,
            form: submission.form,
            created_at,
            verification_url,
            pdf_ref,
            qr_ref: qr.public_path,
            content_hash,
            derived: Derived::compute(submission),
            patient_code: submission.patient_code(),
            patient_name: submission.patient_name(),
        })
    }

    fn render_and_store_pdf(
        &self,
        id: &CertificateId,
        created_at: DateTime<Utc>,
        verification_url: &str,
        submission: &Submission,
        qr_png: &[u8],
    ) -> CertResult<String> {
        let derived = Derived::compute(submission);
        let document = compose(&CertificateContent {
            brand: self.config.brand(),
            id,
            created_at,
            verification_url,
            submission,
            derived: &derived,
            consent_text: self.config.consent_text(),
            qr_png,
        });
        let bytes = self.pdf.render(&document)?;
        let stored = self
            .store
            .write(id, ArtifactKind::Pdf, &bytes)
            .map_err(CertError::StorageWriteFailed)?;
        Ok(stored.public_path)
    }

    fn read_back_hash(&self, id: &CertificateId) -> CertResult<ContentHash> {
        let bytes = self
            .store
            .read(id, ArtifactKind::Pdf)
            .map_err(CertError::StorageReadFailed)?
            .ok_or_else(|| {
                CertError::StorageReadFailed(FilesError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("PDF for {} vanished after write", id),
                )))
            })?;
        Ok(hash_bytes(&bytes))
    }

    /// Removes artifacts written for a failed generation and returns the error to report.
    ///
    /// Every kind is attempted even if an earlier removal fails; the first cleanup failure is
    /// reported alongside the original error.
    pub(crate) fn discard(
        &self,
        id: &CertificateId,
        kinds: &[ArtifactKind],
        error: CertError,
    ) -> CertError {
        tracing::warn!(id = %id, error = %error, "generation failed, removing artifacts");
        let mut first_failure = None;
        for kind in kinds {
            if let Err(cleanup_error) = self.store.remove(id, *kind) {
                tracing::error!(id = %id, kind = ?kind, error = %cleanup_error, "artifact cleanup failed");
                first_failure.get_or_insert(cleanup_error);
            }
        }
        match first_failure {
            Some(cleanup_error) => CertError::CleanupAfterGenerateFailed {
                id: id.to_string(),
                generate_error: Box::new(error),
                cleanup_error,
            },
            None => error,
        }
    }
}
