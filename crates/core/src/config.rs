//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Environment variables are read only by [`CoreConfig::from_env`];
//! nothing in the request path consults the process environment.

use crate::constants::{
    CONSENT_TEXT_PLACEHOLDER, DEFAULT_BRAND, DEFAULT_CERTS_DIR,
    DEFAULT_CONSENT_TEXT_PATH, DEFAULT_DATA_DIR, DEFAULT_MIRROR_TIMEOUT_SECS,
    DEFAULT_OBJECT_BUCKET, LEDGER_FILENAME, MIRROR_JOURNAL_FILENAME,
};
use crate::validation::validate_public_base_url;
use crate::{CertError, CertResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use trialcert_uuid::CertificateId;

/// Where replicas of records and PDFs are sent. Every target is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MirrorConfig {
    pub directory: Option<PathBuf>,
    pub document_store_url: Option<String>,
    pub object_store_url: Option<String>,
    pub object_bucket: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl MirrorConfig {
    pub fn disabled() -> Self {
        Self {
            object_bucket: DEFAULT_OBJECT_BUCKET.to_string(),
            timeout: Duration::from_secs(DEFAULT_MIRROR_TIMEOUT_SECS),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.directory.is_some()
            || self.document_store_url.is_some()
            || self.object_store_url.is_some()
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    certs_dir: PathBuf,
    base_url: Option<String>,
    brand: String,
    consent_text: String,
    signing_key: Option<String>,
    trusted_cert: Option<String>,
    mirrors: MirrorConfig,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// The base URL is validated and normalised (trailing `/` trimmed). Without one, each
    /// submission's verification link is built from the request that carried it.
    pub fn new(
        data_dir: PathBuf,
        certs_dir: PathBuf,
        base_url: Option<&str>,
        brand: String,
        consent_text: String,
    ) -> CertResult<Self> {
        let base_url = base_url.map(validate_public_base_url).transpose()?;

        if brand.trim().is_empty() {
            return Err(CertError::InvalidInput("brand cannot be empty".into()));
        }

        Ok(Self {
            data_dir,
            certs_dir,
            base_url,
            brand,
            consent_text,
            signing_key: None,
            trusted_cert: None,
            mirrors: MirrorConfig::disabled(),
        })
    }

    /// Signing key as PEM text, a path to a PEM file, or base64 of the PEM.
    pub fn with_signing_key(mut self, signing_key: Option<String>) -> Self {
        self.signing_key = signing_key;
        self
    }

    /// Site certificate or public key PEM (inline or a path) that record signatures must match.
    pub fn with_trusted_cert(mut self, trusted_cert: Option<String>) -> Self {
        self.trusted_cert = trusted_cert;
        self
    }

    pub fn with_mirrors(mut self, mirrors: MirrorConfig) -> Self {
        self.mirrors = mirrors;
        self
    }

    /// Resolve configuration from `TRIALCERT_*` environment variables.
    pub fn from_env() -> CertResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> CertResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_dir = PathBuf::from(get("TRIALCERT_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));
        let certs_dir =
            PathBuf::from(get("TRIALCERT_CERTS_DIR").unwrap_or_else(|| DEFAULT_CERTS_DIR.into()));
        let base_url = get("TRIALCERT_BASE_URL");
        let brand = get("TRIALCERT_BRAND").unwrap_or_else(|| DEFAULT_BRAND.into());
        let consent_path = PathBuf::from(
            get("TRIALCERT_CONSENT_TEXT").unwrap_or_else(|| DEFAULT_CONSENT_TEXT_PATH.into()),
        );
        let consent_text = load_consent_text(&consent_path)?;

        let timeout = match get("TRIALCERT_MIRROR_TIMEOUT_SECS") {
            Some(value) => value.parse::<u64>().map_err(|_| {
                CertError::InvalidInput(format!(
                    "TRIALCERT_MIRROR_TIMEOUT_SECS must be a whole number of seconds, got {value}"
                ))
            })?,
            None => DEFAULT_MIRROR_TIMEOUT_SECS,
        };

        let mirrors = MirrorConfig {
            directory: get("TRIALCERT_MIRROR_DIR").map(PathBuf::from),
            document_store_url: get("TRIALCERT_DOCUMENT_STORE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            object_store_url: get("TRIALCERT_OBJECT_STORE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            object_bucket: get("TRIALCERT_OBJECT_STORE_BUCKET")
                .unwrap_or_else(|| DEFAULT_OBJECT_BUCKET.into()),
            api_key: get("TRIALCERT_MIRROR_API_KEY"),
            timeout: Duration::from_secs(timeout),
        };

        Ok(
            Self::new(data_dir, certs_dir, base_url.as_deref(), brand, consent_text)?
                .with_signing_key(get("TRIALCERT_SIGNING_KEY"))
                .with_trusted_cert(get("TRIALCERT_TRUSTED_CERT"))
                .with_mirrors(mirrors),
        )
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn certs_dir(&self) -> &Path {
        &self.certs_dir
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILENAME)
    }

    pub fn mirror_journal_path(&self) -> PathBuf {
        self.data_dir.join(MIRROR_JOURNAL_FILENAME)
    }

    /// Configured public base URL, if any.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Base URL for a new certificate: the configured one, else the one the request arrived on.
    ///
    /// # Errors
    ///
    /// `MissingBaseUrl` when neither is available, `InvalidInput` when the request base is not
    /// a usable URL.
    pub fn resolve_base_url(&self, request_base: Option<&str>) -> CertResult<String> {
        match (&self.base_url, request_base) {
            (Some(configured), _) => Ok(configured.clone()),
            (None, Some(request_base)) => validate_public_base_url(request_base),
            (None, None) => Err(CertError::MissingBaseUrl),
        }
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn consent_text(&self) -> &str {
        &self.consent_text
    }

    pub fn signing_key(&self) -> Option<&str> {
        self.signing_key.as_deref()
    }

    pub fn trusted_cert(&self) -> Option<&str> {
        self.trusted_cert.as_deref()
    }

    pub fn mirrors(&self) -> &MirrorConfig {
        &self.mirrors
    }
}

/// Public verification URL of a certificate: `<base-url>/verify/<id>`.
pub fn verification_url(base_url: &str, id: &CertificateId) -> String {
    format!("{}/verify/{}", base_url, id)
}

/// Read the consent text, falling back to a visible placeholder if the file does not exist.
pub fn load_consent_text(path: &Path) -> CertResult<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "consent text not found, using placeholder");
            Ok(CONSENT_TEXT_PLACEHOLDER.to_string())
        }
        Err(e) => Err(CertError::InvalidInput(format!(
            "failed to read consent text {}: {}",
            path.display(),
            e
        ))),
    }
}
