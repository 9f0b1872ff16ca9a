//! Best-effort replicas of records and PDFs.
//!
//! Mirrors run after the ledger append has succeeded, so they never decide whether a
//! certification happened. A failed replication is logged and remembered in the
//! [`MirrorJournal`]; [`MirrorSet::reconcile`] retries what is outstanding.
//!
//! The server journals failures while `trialcert reconcile` may be rewriting the same journal
//! from another process. Both sides take an exclusive OS lock on `<journal>.jsonl.lock` around
//! every journal read-modify-write.
//!
//! Mirror calls block. Callers on an async runtime run them on a blocking thread.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use trialcert_files::{ArtifactKind, ArtifactStore};
use trialcert_uuid::CertificateId;

use crate::config::MirrorConfig;
use crate::constants::JOURNAL_LOCK_EXTENSION;
use crate::ledger::{CertificationRecord, Ledger};
use crate::{CertError, CertResult};

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("mirror request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mirror {target} responded with status {status}")]
    Status { target: String, status: u16 },
    #[error("mirror I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize record for mirror: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("nothing to replicate: {0}")]
    Missing(String),
}

/// Replica of ledger records, grouped into one collection per form.
pub trait DocumentMirror: Send + Sync {
    fn name(&self) -> &str;
    fn put_record(&self, collection: &str, record: &CertificationRecord) -> Result<(), MirrorError>;
}

/// Replica of certificate PDFs, keyed `<form>/<id>.pdf`.
pub trait ObjectMirror: Send + Sync {
    fn name(&self) -> &str;
    fn put_object(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), MirrorError>;
}

pub fn object_key(record: &CertificationRecord) -> String {
    format!("{}/{}", record.form, record.id.file_name(ArtifactKind::Pdf.extension()))
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, MirrorError> {
    Ok(reqwest::blocking::Client::builder().timeout(timeout).build()?)
}

fn check_status(target: &str, response: reqwest::blocking::Response) -> Result<(), MirrorError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(MirrorError::Status {
            target: target.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Document store reached over HTTP: `POST <base>/<collection>` with the record as JSON.
///
/// The record id is sent as `Idempotency-Key`, so a retried replication does not duplicate.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpDocumentStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }
}

impl DocumentMirror for HttpDocumentStore {
    fn name(&self) -> &str {
        "document-store"
    }

    fn put_record(&self, collection: &str, record: &CertificationRecord) -> Result<(), MirrorError> {
        let url = format!("{}/{}", self.base_url, collection);
        let mut request = http_client(self.timeout)?
            .post(&url)
            .header("Idempotency-Key", record.id.to_string())
            .json(record);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        check_status(&url, request.send()?)
    }
}

/// Object store reached over HTTP: `PUT <base>/<bucket>/<key>` with the raw bytes.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    base_url: String,
    bucket: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key,
            timeout,
        }
    }
}

impl ObjectMirror for HttpObjectStore {
    fn name(&self) -> &str {
        "object-store"
    }

    fn put_object(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), MirrorError> {
        let url = format!("{}/{}/{}", self.base_url, self.bucket, key);
        let mut request = http_client(self.timeout)?
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec());
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        check_status(&url, request.send()?)
    }
}

/// Local replica directory implementing both mirrors.
///
/// ```text
/// <root>/
/// ├── documents/trials_consent/<id>.json
/// └── objects/consent/<id>.pdf
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryMirror {
    root: PathBuf,
}

impl DirectoryMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write(path: &Path, bytes: &[u8]) -> Result<(), MirrorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }
}

impl DocumentMirror for DirectoryMirror {
    fn name(&self) -> &str {
        "directory"
    }

    fn put_record(&self, collection: &str, record: &CertificationRecord) -> Result<(), MirrorError> {
        let path = self
            .root
            .join("documents")
            .join(collection)
            .join(record.id.file_name("json"));
        Self::write(&path, &serde_json::to_vec_pretty(record)?)
    }
}

impl ObjectMirror for DirectoryMirror {
    fn name(&self) -> &str {
        "directory"
    }

    fn put_object(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), MirrorError> {
        Self::write(&self.root.join("objects").join(key), bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorTarget {
    Document,
    Object,
}

/// One replication that has not yet succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReplication {
    pub id: CertificateId,
    pub target: MirrorTarget,
    pub mirror: String,
    pub failed_at: DateTime<Utc>,
    pub error: String,
}

/// Append-only list of outstanding replications (`mirror_pending.jsonl`).
#[derive(Debug)]
pub struct MirrorJournal {
    path: PathBuf,
    lock: Mutex<()>,
}

/// Held while the journal is read or modified: the in-process mutex plus the OS file lock,
/// which is released when the lock file is closed.
struct JournalLock<'a> {
    _thread: MutexGuard<'a, ()>,
    _file: File,
}

impl MirrorJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn exclusive(&self) -> CertResult<JournalLock<'_>> {
        let thread = self.lock.lock().map_err(|_| CertError::LockPoisoned)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(CertError::LedgerOpen)?;
        }
        let lock_path = self.path.with_extension(JOURNAL_LOCK_EXTENSION);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(CertError::LedgerOpen)?;
        file.lock_exclusive().map_err(|source| CertError::FileLocked {
            path: lock_path.display().to_string(),
            source,
        })?;
        Ok(JournalLock {
            _thread: thread,
            _file: file,
        })
    }

    pub fn record(&self, entry: &PendingReplication) -> CertResult<()> {
        let mut line = serde_json::to_vec(entry).map_err(CertError::Serialization)?;
        line.push(b'\n');

        let _guard = self.exclusive()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(CertError::LedgerOpen)?;
        file.write_all(&line).map_err(CertError::LedgerWrite)?;
        file.sync_data().map_err(CertError::LedgerWrite)
    }

    /// Outstanding entries; unreadable lines are skipped with a warning.
    pub fn pending(&self) -> CertResult<Vec<PendingReplication>> {
        let _guard = self.exclusive()?;
        self.read_unlocked()
    }

    fn read_unlocked(&self) -> CertResult<Vec<PendingReplication>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CertError::LedgerRead(e)),
        };
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "skipping unreadable mirror journal entry");
                    None
                }
            })
            .collect())
    }

    /// Replaces the journal with `remaining`, atomically.
    fn rewrite(&self, remaining: &[PendingReplication]) -> CertResult<()> {
        let mut contents = Vec::new();
        for entry in remaining {
            serde_json::to_writer(&mut contents, entry).map_err(CertError::Serialization)?;
            contents.push(b'\n');
        }
        let temp = self.path.with_extension("jsonl.partial");
        fs::write(&temp, &contents).map_err(CertError::LedgerWrite)?;
        fs::rename(&temp, &self.path).map_err(CertError::LedgerWrite)
    }
}

/// Outcome of a reconcile sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub retried: usize,
    pub succeeded: usize,
    pub still_pending: usize,
}

/// All configured mirrors plus the journal of failures.
pub struct MirrorSet {
    documents: Vec<Arc<dyn DocumentMirror>>,
    objects: Vec<Arc<dyn ObjectMirror>>,
    journal: MirrorJournal,
}

impl MirrorSet {
    pub fn new(journal: MirrorJournal) -> Self {
        Self {
            documents: Vec::new(),
            objects: Vec::new(),
            journal,
        }
    }

    /// Builds the mirrors named in the configuration.
    pub fn from_config(config: &MirrorConfig, journal: MirrorJournal) -> Self {
        let mut set = Self::new(journal);
        if let Some(directory) = &config.directory {
            let mirror = Arc::new(DirectoryMirror::new(directory.clone()));
            set = set.with_document_mirror(mirror.clone()).with_object_mirror(mirror);
        }
        if let Some(url) = &config.document_store_url {
            set = set.with_document_mirror(Arc::new(HttpDocumentStore::new(
                url.clone(),
                config.api_key.clone(),
                config.timeout,
            )));
        }
        if let Some(url) = &config.object_store_url {
            set = set.with_object_mirror(Arc::new(HttpObjectStore::new(
                url.clone(),
                config.object_bucket.clone(),
                config.api_key.clone(),
                config.timeout,
            )));
        }
        set
    }

    pub fn with_document_mirror(mut self, mirror: Arc<dyn DocumentMirror>) -> Self {
        self.documents.push(mirror);
        self
    }

    pub fn with_object_mirror(mut self, mirror: Arc<dyn ObjectMirror>) -> Self {
        self.objects.push(mirror);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.objects.is_empty()
    }

    pub fn journal(&self) -> &MirrorJournal {
        &self.journal
    }

    /// Sends a freshly appended record and its PDF to every mirror. Never fails; failures are
    /// logged and journaled. Returns the number of failed replications.
    pub fn replicate(&self, record: &CertificationRecord, pdf: &[u8]) -> usize {
        let mut failures = 0;
        for mirror in &self.documents {
            if let Err(e) = mirror.put_record(&record.form.mirror_collection(), record) {
                failures += 1;
                self.note_failure(record.id, MirrorTarget::Document, mirror.name(), &e);
            }
        }
        for mirror in &self.objects {
            if let Err(e) = mirror.put_object(&object_key(record), pdf, ArtifactKind::Pdf.media_type()) {
                failures += 1;
                self.note_failure(record.id, MirrorTarget::Object, mirror.name(), &e);
            }
        }
        failures
    }

    fn note_failure(&self, id: CertificateId, target: MirrorTarget, mirror: &str, error: &MirrorError) {
        tracing::warn!(id = %id, mirror, target = ?target, error = %error, "mirror replication failed");
        let entry = PendingReplication {
            id,
            target,
            mirror: mirror.to_string(),
            failed_at: Utc::now(),
            error: error.to_string(),
        };
        if let Err(e) = self.journal.record(&entry) {
            tracing::error!(id = %id, error = %e, "failed to journal mirror failure");
        }
    }

    /// Retries every journaled replication and keeps only those that still fail.
    ///
    /// The journal is not locked while mirrors are contacted. Entries journaled in the meantime,
    /// by this process or another, are kept when the journal is rewritten.
    pub fn reconcile(&self, ledger: &dyn Ledger, store: &dyn ArtifactStore) -> CertResult<ReconcileReport> {
        let pending = self.journal.pending()?;
        let mut report = ReconcileReport {
            retried: pending.len(),
            ..ReconcileReport::default()
        };

        let mut remaining = Vec::new();
        for entry in &pending {
            match self.retry(entry, ledger, store) {
                Ok(()) => {
                    report.succeeded += 1;
                    tracing::info!(id = %entry.id, mirror = %entry.mirror, "mirror replication reconciled");
                }
                Err(e) => {
                    tracing::warn!(id = %entry.id, mirror = %entry.mirror, error = %e, "mirror replication still failing");
                    remaining.push(PendingReplication {
                        failed_at: Utc::now(),
                        error: e.to_string(),
                        ..entry.clone()
                    });
                }
            }
        }

        report.still_pending = remaining.len();

        let _guard = self.journal.exclusive()?;
        let arrived: Vec<_> = self
            .journal
            .read_unlocked()?
            .into_iter()
            .filter(|entry| !pending.contains(entry))
            .collect();
        if !arrived.is_empty() {
            tracing::debug!(count = arrived.len(), "keeping mirror failures journaled during reconcile");
        }
        remaining.extend(arrived);
        self.journal.rewrite(&remaining)?;
        Ok(report)
    }

    fn retry(
        &self,
        entry: &PendingReplication,
        ledger: &dyn Ledger,
        store: &dyn ArtifactStore,
    ) -> Result<(), MirrorError> {
        let record = ledger
            .find_by_id(&entry.id)
            .map_err(|e| MirrorError::Missing(e.to_string()))?
            .ok_or_else(|| MirrorError::Missing(format!("no ledger record for {}", entry.id)))?;

        match entry.target {
            MirrorTarget::Document => {
                let mirror = self
                    .documents
                    .iter()
                    .find(|m| m.name() == entry.mirror)
                    .ok_or_else(|| MirrorError::Missing(format!("mirror {} not configured", entry.mirror)))?;
                mirror.put_record(&record.form.mirror_collection(), &record)
            }
            MirrorTarget::Object => {
                let mirror = self
                    .objects
                    .iter()
                    .find(|m| m.name() == entry.mirror)
                    .ok_or_else(|| MirrorError::Missing(format!("mirror {} not configured", entry.mirror)))?;
                let pdf = store
                    .read(&record.id, ArtifactKind::Pdf)
                    .map_err(|e| MirrorError::Missing(e.to_string()))?
                    .ok_or_else(|| MirrorError::Missing(format!("no PDF for {}", record.id)))?;
                mirror.put_object(&object_key(&record), &pdf, ArtifactKind::Pdf.media_type())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ledger::tests::record;
    use crate::ledger::JsonlLedger;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;
    use trialcert_files::LocalArtifactStore;

    /// Document and object mirror that fails while `down` is set.
    #[derive(Default)]
    pub(crate) struct FlakyMirror {
        pub(crate) down: AtomicBool,
        pub(crate) received: Mutex<Vec<String>>,
    }

    impl FlakyMirror {
        pub(crate) fn offline() -> Self {
            let mirror = Self::default();
            mirror.down.store(true, Ordering::SeqCst);
            mirror
        }

        fn check(&self, what: String) -> Result<(), MirrorError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(MirrorError::Status {
                    target: what,
                    status: 503,
                });
            }
            self.received.lock().unwrap().push(what);
            Ok(())
        }
    }

    impl DocumentMirror for FlakyMirror {
        fn name(&self) -> &str {
            "flaky"
        }

        fn put_record(&self, collection: &str, record: &CertificationRecord) -> Result<(), MirrorError> {
            self.check(format!("{}/{}", collection, record.id))
        }
    }

    impl ObjectMirror for FlakyMirror {
        fn name(&self) -> &str {
            "flaky"
        }

        fn put_object(&self, key: &str, _bytes: &[u8], _content_type: &str) -> Result<(), MirrorError> {
            self.check(key.to_string())
        }
    }

    #[test]
    fn directory_mirror_writes_documents_and_objects() {
        let dir = TempDir::new().unwrap();
        let mirror = DirectoryMirror::new(dir.path());
        let journal = MirrorJournal::new(dir.path().join("pending.jsonl"));
        let mirror = Arc::new(mirror);
        let set = MirrorSet::new(journal)
            .with_document_mirror(mirror.clone())
            .with_object_mirror(mirror);
        let rec = record(CertificateId::new());

        assert_eq!(set.replicate(&rec, b"%PDF-1.3"), 0);

        let doc_path = dir
            .path()
            .join("documents/trials_consent")
            .join(format!("{}.json", rec.id));
        let stored: CertificationRecord =
            serde_json::from_slice(&fs::read(doc_path).unwrap()).unwrap();
        assert_eq!(stored, rec);
        let pdf = fs::read(dir.path().join("objects/consent").join(format!("{}.pdf", rec.id))).unwrap();
        assert_eq!(pdf, b"%PDF-1.3");
    }

    #[test]
    fn failures_are_journaled_and_reconciled() {
        let dir = TempDir::new().unwrap();
        let ledger = JsonlLedger::open(&dir.path().join("records.jsonl")).unwrap();
        let store = LocalArtifactStore::open_or_create(&dir.path().join("certs")).unwrap();
        let flaky = Arc::new(FlakyMirror::offline());
        let set = MirrorSet::new(MirrorJournal::new(dir.path().join("pending.jsonl")))
            .with_document_mirror(flaky.clone())
            .with_object_mirror(flaky.clone());

        let rec = record(CertificateId::new());
        ledger.append(&rec).unwrap();
        store.write(&rec.id, ArtifactKind::Pdf, b"%PDF-1.3").unwrap();

        assert_eq!(set.replicate(&rec, b"%PDF-1.3"), 2);
        assert_eq!(set.journal().pending().unwrap().len(), 2);

        // still down: nothing clears
        let report = set.reconcile(&ledger, &store).unwrap();
        assert_eq!(report, ReconcileReport { retried: 2, succeeded: 0, still_pending: 2 });

        flaky.down.store(false, Ordering::SeqCst);
        let report = set.reconcile(&ledger, &store).unwrap();
        assert_eq!(report, ReconcileReport { retried: 2, succeeded: 2, still_pending: 0 });
        assert!(set.journal().pending().unwrap().is_empty());

        let received = flaky.received.lock().unwrap().clone();
        assert!(received.contains(&format!("trials_consent/{}", rec.id)));
        assert!(received.contains(&format!("consent/{}.pdf", rec.id)));
    }

    /// Mirror that, while being retried, has a second journal handle (another process, in
    /// production) record a fresh failure.
    struct JournalingMirror {
        other: MirrorJournal,
        late: PendingReplication,
    }

    impl DocumentMirror for JournalingMirror {
        fn name(&self) -> &str {
            "journaling"
        }

        fn put_record(&self, _collection: &str, _record: &CertificationRecord) -> Result<(), MirrorError> {
            self.other
                .record(&self.late)
                .map_err(|e| MirrorError::Missing(e.to_string()))
        }
    }

    #[test]
    fn failure_journaled_during_reconcile_is_kept() {
        let dir = TempDir::new().unwrap();
        let journal_path = dir.path().join("pending.jsonl");
        let ledger = JsonlLedger::open(&dir.path().join("records.jsonl")).unwrap();
        let store = LocalArtifactStore::open_or_create(&dir.path().join("certs")).unwrap();
        let rec = record(CertificateId::new());
        ledger.append(&rec).unwrap();

        let late = PendingReplication {
            id: CertificateId::new(),
            target: MirrorTarget::Object,
            mirror: "object-store".into(),
            failed_at: Utc::now(),
            error: "timeout".into(),
        };
        let set = MirrorSet::new(MirrorJournal::new(&journal_path)).with_document_mirror(Arc::new(
            JournalingMirror {
                other: MirrorJournal::new(&journal_path),
                late: late.clone(),
            },
        ));
        set.journal()
            .record(&PendingReplication {
                id: rec.id,
                target: MirrorTarget::Document,
                mirror: "journaling".into(),
                failed_at: Utc::now(),
                error: "503".into(),
            })
            .unwrap();

        let report = set.reconcile(&ledger, &store).unwrap();
        assert_eq!(report, ReconcileReport { retried: 1, succeeded: 1, still_pending: 0 });
        assert_eq!(set.journal().pending().unwrap(), vec![late]);
    }

    #[test]
    fn unknown_record_stays_pending() {
        let dir = TempDir::new().unwrap();
        let ledger = JsonlLedger::open(&dir.path().join("records.jsonl")).unwrap();
        let store = LocalArtifactStore::open_or_create(&dir.path().join("certs")).unwrap();
        let set = MirrorSet::new(MirrorJournal::new(dir.path().join("pending.jsonl")))
            .with_document_mirror(Arc::new(FlakyMirror::default()));
        set.journal()
            .record(&PendingReplication {
                id: CertificateId::new(),
                target: MirrorTarget::Document,
                mirror: "flaky".into(),
                failed_at: Utc::now(),
                error: "timeout".into(),
            })
            .unwrap();

        let report = set.reconcile(&ledger, &store).unwrap();
        assert_eq!(report.still_pending, 1);
    }

    #[test]
    fn http_mirror_failure_is_reported_not_panicked() {
        // Nothing listens on port 9 (discard) in the test environment.
        let mirror = HttpDocumentStore::new("http://127.0.0.1:9", None, Duration::from_millis(500));
        let rec = record(CertificateId::new());
        assert!(mirror.put_record("trials_consent", &rec).is_err());
    }

    #[test]
    fn from_config_builds_configured_mirrors() {
        let dir = TempDir::new().unwrap();
        let config = MirrorConfig {
            directory: Some(dir.path().join("replica")),
            document_store_url: Some("http://127.0.0.1:9".into()),
            ..MirrorConfig::disabled()
        };
        let set = MirrorSet::from_config(&config, MirrorJournal::new(dir.path().join("p.jsonl")));
        assert_eq!(set.documents.len(), 2);
        assert_eq!(set.objects.len(), 1);
        assert!(MirrorSet::new(MirrorJournal::new(dir.path().join("q.jsonl"))).is_empty());
    }
}
