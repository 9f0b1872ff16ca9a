//! Certification service: the full integrity pipeline behind one type.
//!
//! `certify` runs generate → sign → append → replicate. The ledger append is the commit point:
//! before it nothing is recorded and artifacts are cleaned up on failure; after it the
//! certificate exists and mirror problems are only logged.
//!
//! All methods block. Async callers wrap them in `tokio::task::spawn_blocking`.

use p256::ecdsa::VerifyingKey;
use std::sync::Arc;
use trialcert_files::{ArtifactKind, ArtifactStore, LocalArtifactStore};
use trialcert_uuid::CertificateId;

use crate::config::CoreConfig;
use crate::forms::Submission;
use crate::generator::ArtifactGenerator;
use crate::ledger::{CertificationRecord, JsonlLedger, Ledger};
use crate::mirror::{MirrorJournal, MirrorSet, ReconcileReport};
use crate::render::{PdfRenderer, PrintPdfRenderer, QrCodeRenderer, QrRenderer};
use crate::signing::{load_trusted_key, RecordSigner};
use crate::verifier::{VerificationResult, Verifier};
use crate::{CertError, CertResult};

pub struct CertificationService {
    config: Arc<CoreConfig>,
    generator: ArtifactGenerator,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ArtifactStore>,
    verifier: Verifier,
    signer: Option<RecordSigner>,
    mirrors: MirrorSet,
}

impl CertificationService {
    /// Wires the service from explicit collaborators.
    pub fn new(
        config: Arc<CoreConfig>,
        store: Arc<dyn ArtifactStore>,
        ledger: Arc<dyn Ledger>,
        pdf: Arc<dyn PdfRenderer>,
        qr: Arc<dyn QrRenderer>,
        mirrors: MirrorSet,
    ) -> Self {
        Self {
            generator: ArtifactGenerator::new(config.clone(), store.clone(), pdf, qr),
            config,
            verifier: Verifier::new(ledger.clone(), store.clone()),
            ledger,
            store,
            signer: None,
            mirrors,
        }
    }

    pub fn with_signer(mut self, signer: Option<RecordSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Site key that record signatures are verified against.
    pub fn with_trust_anchor(mut self, trusted: Option<VerifyingKey>) -> Self {
        self.verifier = self.verifier.with_trust_anchor(trusted);
        self
    }

    /// Opens the production stack described by `config`: local artifact directory, JSON-lines
    /// ledger (locked for appending), printpdf and qrcode renderers, configured mirrors, and
    /// the site key if one is set.
    ///
    /// # Errors
    ///
    /// Fails if the certificate directory or ledger cannot be opened, another process holds the
    /// ledger, or a configured key is unreadable.
    pub fn open(config: CoreConfig) -> CertResult<Self> {
        let ledger = JsonlLedger::open(&config.ledger_path())?;
        Self::assemble(config, ledger)
    }

    /// Opens the stack over a read-only snapshot of the ledger, for processes that run next to
    /// the server. Verification, queries and mirror reconciliation work; `certify` does not.
    ///
    /// # Errors
    ///
    /// As for [`CertificationService::open`], minus the ledger lock.
    pub fn open_read_only(config: CoreConfig) -> CertResult<Self> {
        let ledger = JsonlLedger::open_read_only(&config.ledger_path())?;
        Self::assemble(config, ledger)
    }

    fn assemble(config: CoreConfig, ledger: JsonlLedger) -> CertResult<Self> {
        let store = LocalArtifactStore::open_or_create(config.certs_dir())
            .map_err(CertError::StorageWriteFailed)?;
        let signer = config.signing_key().map(RecordSigner::load).transpose()?;
        let trusted = match config.trusted_cert() {
            Some(source) => Some(load_trusted_key(source)?),
            None => signer.as_ref().map(RecordSigner::verifying_key),
        };
        if trusted.is_none() {
            tracing::info!("no site key or trusted certificate configured, signatures will show as unverified");
        }
        let mirrors = MirrorSet::from_config(
            config.mirrors(),
            MirrorJournal::new(config.mirror_journal_path()),
        );

        tracing::info!(
            certs_dir = %config.certs_dir().display(),
            ledger = %config.ledger_path().display(),
            signed = signer.is_some(),
            trust_anchor = trusted.is_some(),
            mirrors = !mirrors.is_empty(),
            "certification service ready"
        );

        Ok(Self::new(
            Arc::new(config),
            Arc::new(store),
            Arc::new(ledger),
            Arc::new(PrintPdfRenderer::new()),
            Arc::new(QrCodeRenderer::new()),
            mirrors,
        )
        .with_signer(signer)
        .with_trust_anchor(trusted))
    }

    /// Certifies one already-validated submission, linking its QR code to the configured base
    /// URL.
    ///
    /// # Errors
    ///
    /// See [`CertificationService::certify_at`].
    pub fn certify(&self, submission: &Submission) -> CertResult<CertificationRecord> {
        self.certify_at(submission, None)
    }

    /// Certifies one already-validated submission. `request_base` (`scheme://host`) is used for
    /// the verification link only when no base URL is configured.
    ///
    /// # Errors
    ///
    /// `MissingBaseUrl` if there is no base URL at all, generation errors, or a ledger error if
    /// the record could not be appended (the artifacts are removed in that case). Mirror
    /// failures never surface here.
    pub fn certify_at(
        &self,
        submission: &Submission,
        request_base: Option<&str>,
    ) -> CertResult<CertificationRecord> {
        let base_url = self.config.resolve_base_url(request_base)?;
        let generated = self.generator.generate(submission, &base_url)?;

        let mut record = CertificationRecord::from_generated(&generated);
        if let Some(signer) = &self.signer {
            record.signature = Some(signer.sign(
                &record.id,
                record.form,
                &record.created_at,
                &record.content_hash,
            ));
        }

        if let Err(e) = self.ledger.append(&record) {
            return Err(self.generator.discard(
                &record.id,
                &[ArtifactKind::Pdf, ArtifactKind::QrPng],
                e,
            ));
        }

        if !self.mirrors.is_empty() {
            match self.store.read(&record.id, ArtifactKind::Pdf) {
                Ok(Some(pdf)) => {
                    self.mirrors.replicate(&record, &pdf);
                }
                Ok(None) => tracing::warn!(id = %record.id, "PDF vanished before replication"),
                Err(e) => tracing::warn!(id = %record.id, error = %e, "could not read PDF for replication"),
            }
        }

        Ok(record)
    }

    pub fn verify(&self, id: &str) -> CertResult<VerificationResult> {
        self.verifier.verify(id)
    }

    /// Looks a record up by its public id; malformed ids simply find nothing.
    pub fn find(&self, id: &str) -> CertResult<Option<CertificationRecord>> {
        match CertificateId::parse(id) {
            Ok(id) => self.ledger.find_by_id(&id),
            Err(_) => Ok(None),
        }
    }

    pub fn list(&self) -> CertResult<Vec<CertificationRecord>> {
        self.ledger.list()
    }

    /// Newest first, at most `limit`.
    pub fn recent(&self, limit: usize) -> CertResult<Vec<CertificationRecord>> {
        let mut records = self.ledger.list()?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    pub fn reconcile_mirrors(&self) -> CertResult<ReconcileReport> {
        self.mirrors.reconcile(self.ledger.as_ref(), self.store.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::FormType;
    use crate::generator::tests::{test_config, FailingPdf, FaultyStore, StubPdf};
    use crate::mirror::tests::FlakyMirror;
    use crate::signing::tests::key_pem;
    use crate::signing::SignatureStatus;
    use crate::verifier::VerificationStatus;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: LocalArtifactStore,
        ledger: Arc<JsonlLedger>,
        service: CertificationService,
    }

    fn fixture_with(pdf: Arc<dyn PdfRenderer>, mirrors: impl FnOnce(MirrorSet) -> MirrorSet) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::open_or_create(&dir.path().join("certs")).unwrap();
        let ledger = Arc::new(JsonlLedger::open(&dir.path().join("records.jsonl")).unwrap());
        let service = CertificationService::new(
            test_config(),
            Arc::new(store.clone()),
            ledger.clone(),
            pdf,
            Arc::new(QrCodeRenderer::new()),
            mirrors(MirrorSet::new(MirrorJournal::new(dir.path().join("pending.jsonl")))),
        );
        Fixture {
            _dir: dir,
            store,
            ledger,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(PrintPdfRenderer::new()), |m| m)
    }

    fn adverse() -> Submission {
        Submission::new(FormType::Adverse)
            .with_field("patient_code", "P-07")
            .with_field("session", "3")
            .with_field("date", "2025-04-10")
            .with_field("check_2", "on")
            .with_field("investigator", "Dr. Haddad")
    }

    fn eligibility(answer: &str) -> Submission {
        let mut submission = Submission::new(FormType::Eligibility)
            .with_field("patient_code", "P-01")
            .with_field("investigator", "Dr. Haddad");
        for i in 1..=6 {
            submission = submission.with_field(format!("inclusion_{}", i), answer);
        }
        submission
    }

    #[test]
    fn certified_record_verifies_as_valid() {
        let fx = fixture();
        let record = fx.service.certify(&adverse()).unwrap();

        assert_eq!(record.form, FormType::Adverse);
        assert_eq!(record.patient_code, "P-07");
        assert!(fx.store.artifact_path(&record.id, ArtifactKind::Pdf).exists());
        assert!(fx.store.artifact_path(&record.id, ArtifactKind::QrPng).exists());

        let result = fx.service.verify(&record.id.to_string()).unwrap();
        assert_eq!(result.status, VerificationStatus::Valid);
        assert_eq!(result.record, Some(record.clone()));
        assert_eq!(fx.service.find(&record.id.to_string()).unwrap(), Some(record));
    }

    #[test]
    fn flipping_one_byte_reports_altered() {
        let fx = fixture();
        let record = fx.service.certify(&adverse()).unwrap();

        let path = fx.store.artifact_path(&record.id, ArtifactKind::Pdf);
        let mut bytes = std::fs::read(&path).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x01;
        std::fs::write(&path, bytes).unwrap();

        let result = fx.service.verify(&record.id.to_string()).unwrap();
        assert_eq!(result.status, VerificationStatus::Altered);
        assert_ne!(result.current_hash, Some(record.content_hash.clone()));
        assert_eq!(result.record.unwrap().content_hash, record.content_hash);
    }

    #[test]
    fn missing_pdf_and_unknown_id() {
        let fx = fixture();
        let record = fx.service.certify(&adverse()).unwrap();
        fx.store.remove(&record.id, ArtifactKind::Pdf).unwrap();

        assert_eq!(
            fx.service.verify(&record.id.to_string()).unwrap().status,
            VerificationStatus::ArtifactMissing
        );
        assert_eq!(
            fx.service.verify(&CertificateId::new().to_string()).unwrap().status,
            VerificationStatus::NotFound
        );
        assert_eq!(fx.service.find("nope").unwrap(), None);
    }

    #[test]
    fn derived_values_are_recorded() {
        let fx = fixture();
        let eligible = fx.service.certify(&eligibility("yes")).unwrap();
        let not_eligible = fx.service.certify(&eligibility("no")).unwrap();
        assert_eq!(eligible.eligible, Some(true));
        assert_eq!(not_eligible.eligible, Some(false));
        assert_eq!(eligible.sf36_average, None);
    }

    #[test]
    fn render_failure_leaves_no_record_and_no_artifacts() {
        let fx = fixture_with(Arc::new(FailingPdf), |m| m);

        let err = fx.service.certify(&adverse()).unwrap_err();
        assert!(matches!(err, CertError::RenderFailed(_)));
        assert!(fx.ledger.is_empty().unwrap());
        assert_eq!(std::fs::read_dir(fx.store.root_directory()).unwrap().count(), 0);
    }

    #[test]
    fn pdf_write_failure_after_qr_write_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let local = LocalArtifactStore::open_or_create(&dir.path().join("certs")).unwrap();
        let ledger = Arc::new(JsonlLedger::open(&dir.path().join("records.jsonl")).unwrap());
        let service = CertificationService::new(
            test_config(),
            Arc::new(FaultyStore::failing_writes(local.clone(), ArtifactKind::Pdf)),
            ledger.clone(),
            Arc::new(StubPdf),
            Arc::new(QrCodeRenderer::new()),
            MirrorSet::new(MirrorJournal::new(dir.path().join("pending.jsonl"))),
        );

        let err = service.certify(&adverse()).unwrap_err();
        assert!(matches!(err, CertError::StorageWriteFailed(_)));
        assert!(ledger.is_empty().unwrap());
        assert_eq!(std::fs::read_dir(local.root_directory()).unwrap().count(), 0);
    }

    #[test]
    fn request_base_is_used_only_without_configured_base() {
        let dir = TempDir::new().unwrap();
        let unset = CoreConfig::new(
            dir.path().join("data"),
            dir.path().join("certs"),
            None,
            "TrialCert".into(),
            "I consent.".into(),
        )
        .unwrap();
        let service = CertificationService::open(unset).unwrap();

        let err = service.certify(&adverse()).unwrap_err();
        assert!(matches!(err, CertError::MissingBaseUrl));
        assert!(service.list().unwrap().is_empty());

        let record = service
            .certify_at(&adverse(), Some("https://site-b.example.net"))
            .unwrap();
        assert_eq!(
            service.verify(&record.id.to_string()).unwrap().status,
            VerificationStatus::Valid
        );
    }

    #[test]
    fn mirror_outage_does_not_affect_certification() {
        let flaky = Arc::new(FlakyMirror::offline());
        let mirror = flaky.clone();
        let fx = fixture_with(Arc::new(PrintPdfRenderer::new()), move |set| {
            set.with_document_mirror(mirror.clone()).with_object_mirror(mirror)
        });

        let record = fx.service.certify(&adverse()).unwrap();
        assert_eq!(
            fx.service.verify(&record.id.to_string()).unwrap().status,
            VerificationStatus::Valid
        );

        flaky.down.store(false, Ordering::SeqCst);
        let report = fx.service.reconcile_mirrors().unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.still_pending, 0);
    }

    #[test]
    fn records_are_signed_when_a_key_is_configured() {
        let fx = fixture();
        let signer = RecordSigner::load(&key_pem()).unwrap();
        let trusted = signer.verifying_key();
        let service = fx.service.with_signer(Some(signer)).with_trust_anchor(Some(trusted));

        let record = service.certify(&adverse()).unwrap();
        assert!(record.signature.is_some());
        assert_eq!(
            service.verify(&record.id.to_string()).unwrap().signature,
            SignatureStatus::Valid
        );
    }

    #[test]
    fn open_trusts_the_configured_site_certificate() {
        let dir = TempDir::new().unwrap();
        let (cert_pem, key_pem) =
            trialcert_certificates::SiteCertificate::create("Site 01", "site-01", 30).unwrap();
        let other_key = crate::signing::tests::key_pem();
        let cert_path = dir.path().join("site.crt");
        std::fs::write(&cert_path, cert_pem).unwrap();

        let config = |key: String| {
            CoreConfig::new(
                dir.path().join("data"),
                dir.path().join("certs"),
                Some("https://trials.example.org"),
                "TrialCert".into(),
                "I consent.".into(),
            )
            .unwrap()
            .with_signing_key(Some(key))
            .with_trusted_cert(Some(cert_path.display().to_string()))
        };

        let genuine = {
            let service = CertificationService::open(config(key_pem)).unwrap();
            service.certify(&adverse()).unwrap()
        };
        let foreign = {
            let service = CertificationService::open(config(other_key)).unwrap();
            let record = service.certify(&adverse()).unwrap();
            assert_eq!(
                service.verify(&record.id.to_string()).unwrap().signature,
                SignatureStatus::Invalid
            );
            record
        };

        let reader = CertificationService::open_read_only(config(crate::signing::tests::key_pem())).unwrap();
        assert_eq!(
            reader.verify(&genuine.id.to_string()).unwrap().signature,
            SignatureStatus::Valid
        );
        assert_eq!(
            reader.verify(&foreign.id.to_string()).unwrap().signature,
            SignatureStatus::Invalid
        );
    }

    #[test]
    fn read_only_service_coexists_with_the_writer() {
        let dir = TempDir::new().unwrap();
        let config = CoreConfig::new(
            dir.path().join("data"),
            dir.path().join("certs"),
            Some("https://trials.example.org"),
            "TrialCert".into(),
            "I consent.".into(),
        )
        .unwrap();
        let writer = CertificationService::open(config.clone()).unwrap();
        let record = writer.certify(&adverse()).unwrap();

        assert!(matches!(
            CertificationService::open(config.clone()),
            Err(CertError::FileLocked { .. })
        ));

        let reader = CertificationService::open_read_only(config).unwrap();
        assert_eq!(reader.list().unwrap(), vec![record.clone()]);
        assert_eq!(
            reader.verify(&record.id.to_string()).unwrap().status,
            VerificationStatus::Valid
        );
        assert!(matches!(
            reader.certify(&adverse()),
            Err(CertError::LedgerReadOnly)
        ));
        assert_eq!(writer.list().unwrap().len(), 1);
    }

    #[test]
    fn ids_are_unique_across_concurrent_certifications() {
        let fx = fixture_with(Arc::new(StubPdf), |m| m);
        let service = Arc::new(fx.service);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    (0..125)
                        .map(|_| service.certify(&adverse()).unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 1000);
        assert_eq!(service.list().unwrap().len(), 1000);
        assert_eq!(service.recent(5).unwrap().len(), 5);
        assert_eq!(
            std::fs::read_dir(fx.store.root_directory()).unwrap().count(),
            2000
        );
    }

    #[test]
    fn open_builds_the_stack_from_config() {
        let dir = TempDir::new().unwrap();
        let config = CoreConfig::new(
            dir.path().join("data"),
            dir.path().join("certs"),
            Some("http://localhost:8080"),
            "TrialCert".into(),
            "I consent.".into(),
        )
        .unwrap();

        let service = CertificationService::open(config).unwrap();
        let record = service.certify(&adverse()).unwrap();
        assert!(dir.path().join("data/records.jsonl").exists());
        assert!(dir.path().join("certs").join(format!("{}.pdf", record.id)).exists());
    }
}
