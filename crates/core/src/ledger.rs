//! Integrity ledger.
//!
//! The ledger is the authority on what each certificate's content hash was at creation time.
//! Records are only ever appended; there is no update or delete path.
//!
//! ## On-disk format
//!
//! [`JsonlLedger`] stores one JSON object per line in `<data_dir>/records.jsonl`. An append is a
//! single `write_all` of the serialised line followed by `sync_data`, performed while holding
//! the ledger mutex, so concurrent appends never interleave and an acknowledged record survives
//! a crash. A crash mid-append can leave a torn final line without a newline; it was never
//! acknowledged, so it is dropped with a warning when the ledger is next opened for writing.
//!
//! ## Processes
//!
//! A writable ledger holds an exclusive OS lock (`flock`) on the file for its lifetime, so only
//! one process appends. Other processes, such as the CLI, use [`JsonlLedger::open_read_only`]:
//! no lock, no truncation, and a trailing partial line is treated as an append in progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use trialcert_types::ContentHash;
use trialcert_uuid::CertificateId;

use crate::forms::FormType;
use crate::generator::GeneratedCertificate;
use crate::signing::RecordSignature;
use crate::{CertError, CertResult};

/// The persisted fact that a certificate was issued with a given content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationRecord {
    pub id: CertificateId,
    pub form: FormType,
    pub created_at: DateTime<Utc>,
    pub content_hash: ContentHash,
    pub pdf_ref: String,
    pub qr_ref: String,
    pub patient_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sf36_average: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<RecordSignature>,
}

impl CertificationRecord {
    pub fn from_generated(generated: &GeneratedCertificate) -> Self {
        Self {
            id: generated.id,
            form: generated.form,
            created_at: generated.created_at,
            content_hash: generated.content_hash.clone(),
            pdf_ref: generated.pdf_ref.clone(),
            qr_ref: generated.qr_ref.clone(),
            patient_code: generated.patient_code.clone(),
            patient_name: generated.patient_name.clone(),
            eligible: generated.derived.eligible(),
            sf36_average: generated.derived.sf36_average(),
            signature: None,
        }
    }
}

/// Append-only store of certification records.
pub trait Ledger: Send + Sync {
    /// Durably appends a record.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if a record with the same id exists; nothing is written then.
    fn append(&self, record: &CertificationRecord) -> CertResult<()>;

    fn find_by_id(&self, id: &CertificateId) -> CertResult<Option<CertificationRecord>>;

    /// All records in append order.
    fn list(&self) -> CertResult<Vec<CertificationRecord>>;
}

struct LedgerState {
    /// `None` for a read-only ledger.
    file: Option<File>,
    len: u64,
    records: Vec<CertificationRecord>,
    index: HashMap<CertificateId, usize>,
}

/// JSON-lines [`Ledger`] with an in-memory index loaded at open.
pub struct JsonlLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl std::fmt::Debug for JsonlLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlLedger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonlLedger {
    /// Opens (creating if needed) the ledger file for appending and loads every record.
    ///
    /// # Errors
    ///
    /// - `LedgerOpen` if the file or its directory cannot be created or opened
    /// - `FileLocked` if another process has the ledger open for writing
    /// - `LedgerRead` if the contents cannot be read
    /// - `LedgerCorrupt` if a complete line does not parse
    /// - `DuplicateId` if the file holds the same id twice
    pub fn open(path: &Path) -> CertResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(CertError::LedgerOpen)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(CertError::LedgerOpen)?;
        file.try_lock_exclusive()
            .map_err(|source| CertError::FileLocked {
                path: path.display().to_string(),
                source,
            })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(CertError::LedgerRead)?;

        let (complete, torn) = split_torn_tail(&contents);
        let (records, index) = parse_records(complete)?;

        let len = complete.len() as u64;
        if !torn.is_empty() {
            tracing::warn!(
                path = %path.display(),
                bytes = torn.len(),
                "dropping torn trailing ledger entry"
            );
            file.set_len(len).map_err(CertError::LedgerWrite)?;
            file.sync_data().map_err(CertError::LedgerWrite)?;
        }

        tracing::debug!(path = %path.display(), records = records.len(), "ledger opened");

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(LedgerState {
                file: Some(file),
                len,
                records,
                index,
            }),
        })
    }

    /// Loads a snapshot of the ledger without locking or modifying the file.
    ///
    /// A missing file is an empty ledger. A trailing line without a newline is skipped, since it
    /// may be an append still in flight in the writing process. `append` fails with
    /// `LedgerReadOnly`.
    ///
    /// # Errors
    ///
    /// `LedgerRead`, `LedgerCorrupt` or `DuplicateId`, as for [`JsonlLedger::open`].
    pub fn open_read_only(path: &Path) -> CertResult<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(CertError::LedgerRead(e)),
        };
        let (complete, _in_flight) = split_torn_tail(&contents);
        let (records, index) = parse_records(complete)?;

        tracing::debug!(path = %path.display(), records = records.len(), "ledger opened read-only");

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(LedgerState {
                file: None,
                len: complete.len() as u64,
                records,
                index,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> CertResult<usize> {
        Ok(self.lock()?.records.len())
    }

    pub fn is_empty(&self) -> CertResult<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> CertResult<std::sync::MutexGuard<'_, LedgerState>> {
        self.state.lock().map_err(|_| CertError::LockPoisoned)
    }
}

/// Splits the contents after the last newline off as a possibly torn tail.
fn split_torn_tail(contents: &str) -> (&str, &str) {
    match contents.rfind('\n') {
        Some(last_newline) => contents.split_at(last_newline + 1),
        None => ("", contents),
    }
}

fn parse_records(
    complete: &str,
) -> CertResult<(Vec<CertificationRecord>, HashMap<CertificateId, usize>)> {
    let mut records = Vec::new();
    let mut index = HashMap::new();
    for (number, line) in complete.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: CertificationRecord =
            serde_json::from_str(line).map_err(|source| CertError::LedgerCorrupt {
                line: number + 1,
                source,
            })?;
        if index.insert(record.id, records.len()).is_some() {
            return Err(CertError::DuplicateId(record.id.to_string()));
        }
        records.push(record);
    }
    Ok((records, index))
}

impl Ledger for JsonlLedger {
    fn append(&self, record: &CertificationRecord) -> CertResult<()> {
        let mut line = serde_json::to_vec(record).map_err(CertError::Serialization)?;
        line.push(b'\n');

        let mut guard = self.lock()?;
        let state = &mut *guard;
        let Some(file) = state.file.as_mut() else {
            return Err(CertError::LedgerReadOnly);
        };
        if state.index.contains_key(&record.id) {
            return Err(CertError::DuplicateId(record.id.to_string()));
        }

        let written = file.write_all(&line).and_then(|()| file.sync_data());
        if let Err(e) = written {
            // Roll back a partial line so later appends start on a clean boundary.
            if let Err(truncate_error) = file.set_len(state.len) {
                tracing::error!(error = %truncate_error, "failed to roll back partial ledger append");
            }
            return Err(CertError::LedgerWrite(e));
        }

        state.len += line.len() as u64;
        let position = state.records.len();
        state.index.insert(record.id, position);
        state.records.push(record.clone());

        tracing::info!(id = %record.id, form = %record.form, "record appended to ledger");
        Ok(())
    }

    fn find_by_id(&self, id: &CertificateId) -> CertResult<Option<CertificationRecord>> {
        let state = self.lock()?;
        Ok(state
            .index
            .get(id)
            .and_then(|&position| state.records.get(position))
            .cloned())
    }

    fn list(&self) -> CertResult<Vec<CertificationRecord>> {
        Ok(self.lock()?.records.clone())
    }
}
