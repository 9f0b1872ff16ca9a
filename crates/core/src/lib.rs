//! # TrialCert Core
//!
//! Certification logic for clinical-trial questionnaires.
//!
//! This crate contains the integrity pipeline and its collaborators:
//! - Form descriptors for the seven questionnaires, validation and derived values
//! - Certificate layout and rendering (PDF via printpdf, QR via qrcode)
//! - Artifact generation, the append-only ledger and public verification
//! - Optional record signing with a site key and best-effort mirrors
//!
//! **No API concerns**: HTTP handlers and the command line live in `api-rest` and `cli`.
//! Everything here is synchronous; async callers use `spawn_blocking`.

pub mod config;
pub mod constants;
pub mod error;
pub mod forms;
pub mod generator;
pub mod layout;
pub mod ledger;
pub mod mirror;
pub mod render;
pub mod service;
pub mod signing;
pub mod validation;
pub mod verifier;

pub use config::{CoreConfig, MirrorConfig};
pub use error::{CertError, CertResult};
pub use forms::{Attachment, FormDescriptor, FormType, Submission, ValidationError};
pub use generator::{ArtifactGenerator, GeneratedCertificate};
pub use ledger::{CertificationRecord, JsonlLedger, Ledger};
pub use mirror::{MirrorError, MirrorSet, ReconcileReport};
pub use service::CertificationService;
pub use signing::{RecordSigner, SignatureStatus};
pub use verifier::{VerificationResult, VerificationStatus, Verifier};

pub use trialcert_files::{hash_bytes, hash_file, ArtifactKind, ArtifactStore, LocalArtifactStore};
pub use trialcert_types::ContentHash;
pub use trialcert_uuid::CertificateId;
