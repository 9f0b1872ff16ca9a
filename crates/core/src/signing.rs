//! Site signatures over ledger records.
//!
//! When a site key is configured, every record carries an ECDSA P-256 signature binding its
//! identity to its content hash. A record carries its own public key, so a signature only counts
//! as valid when that key is the site's trust anchor: the configured certificate or public key,
//! or else the verifying half of the signing key. Without an anchor a signature is `Unverified`.
//!
//! ## Signature format
//!
//! - Signed payload: `trialcert:v1:<id>:<form>:<created_at>:<content_hash>`, with `created_at`
//!   in RFC 3339 UTC at millisecond precision.
//! - Signature bytes: raw 64 bytes (`r || s`, not DER), base64.
//! - Public key: SEC1-encoded (uncompressed) public key bytes, base64.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use trialcert_types::ContentHash;
use trialcert_uuid::CertificateId;
use x509_parser::prelude::*;

use crate::constants::SIGNATURE_PAYLOAD_PREFIX;
use crate::forms::FormType;
use crate::ledger::CertificationRecord;
use crate::{CertError, CertResult};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecordSignature {
    /// Base64 of raw 64-byte ECDSA P-256 signature (`r || s`).
    pub signature: String,
    /// Base64 of SEC1-encoded public key bytes.
    pub public_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Unsigned,
    /// Signed by the trusted site key.
    Valid,
    /// Bad signature, or signed by some other key.
    Invalid,
    /// Well-formed signature, but no trust anchor to check the key against.
    Unverified,
}

impl SignatureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureStatus::Unsigned => "unsigned",
            SignatureStatus::Valid => "valid",
            SignatureStatus::Invalid => "invalid",
            SignatureStatus::Unverified => "unverified",
        }
    }
}

pub fn canonical_payload(
    id: &CertificateId,
    form: FormType,
    created_at: &DateTime<Utc>,
    content_hash: &ContentHash,
) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        SIGNATURE_PAYLOAD_PREFIX,
        id,
        form,
        created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        content_hash
    )
}

/// Accepts inline PEM, a path to a PEM file, or base64 of the PEM.
fn load_private_key_pem(private_key: &str) -> CertResult<String> {
    if private_key.contains("-----BEGIN") {
        Ok(private_key.to_string())
    } else if Path::new(private_key).exists() {
        fs::read_to_string(private_key).map_err(CertError::SigningKeyRead)
    } else {
        let decoded = general_purpose::STANDARD
            .decode(private_key.trim())
            .map_err(|e| CertError::EcdsaPrivateKeyParse(Box::new(e)))?;
        String::from_utf8(decoded).map_err(|e| CertError::EcdsaPrivateKeyParse(Box::new(e)))
    }
}

/// Signs records with the site's private key.
#[derive(Clone)]
pub struct RecordSigner {
    signing_key: SigningKey,
    public_key: String,
}

impl std::fmt::Debug for RecordSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSigner")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl RecordSigner {
    /// Loads a PKCS#8 P-256 private key.
    ///
    /// # Errors
    ///
    /// Returns `SigningKeyRead` if a key file cannot be read, or `EcdsaPrivateKeyParse` if the
    /// key is not a valid PKCS#8 P-256 key.
    pub fn load(private_key: &str) -> CertResult<Self> {
        let key_pem = load_private_key_pem(private_key)?;
        let signing_key = SigningKey::from_pkcs8_pem(&key_pem)
            .map_err(|e| CertError::EcdsaPrivateKeyParse(Box::new(e)))?;
        let public_key = general_purpose::STANDARD.encode(
            signing_key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes(),
        );
        Ok(Self {
            signing_key,
            public_key,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.signing_key)
    }

    pub fn sign(
        &self,
        id: &CertificateId,
        form: FormType,
        created_at: &DateTime<Utc>,
        content_hash: &ContentHash,
    ) -> RecordSignature {
        let payload = canonical_payload(id, form, created_at, content_hash);
        let signature: Signature = self.signing_key.sign(payload.as_bytes());
        RecordSignature {
            signature: general_purpose::STANDARD.encode(signature.to_bytes()),
            public_key: self.public_key.clone(),
        }
    }
}

/// Parses a trusted verifying key from a public key PEM or an X.509 certificate PEM.
pub fn verifying_key_from_public_key_or_cert_pem(pem_or_cert: &str) -> CertResult<VerifyingKey> {
    if pem_or_cert.contains("-----BEGIN CERTIFICATE-----") {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem_or_cert.as_bytes())
            .map_err(|e| CertError::InvalidInput(format!("invalid certificate PEM: {e}")))?;
        let (_, cert) = X509Certificate::from_der(pem.contents.as_ref())
            .map_err(|e| CertError::InvalidInput(format!("invalid certificate: {e}")))?;
        VerifyingKey::from_sec1_bytes(cert.public_key().subject_public_key.data.as_ref())
            .map_err(|e| CertError::InvalidInput(format!("certificate key is not P-256: {e}")))
    } else {
        VerifyingKey::from_public_key_pem(pem_or_cert)
            .map_err(|e| CertError::InvalidInput(format!("invalid public key PEM: {e}")))
    }
}

/// Loads the trust anchor from inline PEM or a path to a PEM file.
///
/// # Errors
///
/// `SigningKeyRead` if the file cannot be read, `InvalidInput` if it holds neither a P-256
/// public key nor an X.509 certificate with one.
pub fn load_trusted_key(source: &str) -> CertResult<VerifyingKey> {
    let pem = if source.contains("-----BEGIN") {
        source.to_string()
    } else {
        fs::read_to_string(source).map_err(CertError::SigningKeyRead)?
    };
    verifying_key_from_public_key_or_cert_pem(&pem)
}

/// Checks a record's embedded signature against the trusted site key.
///
/// Without `trusted`, a signature that checks out against its own embedded key is only
/// `Unverified`: anyone able to edit the ledger can produce one.
pub fn verify_record_signature(
    record: &CertificationRecord,
    trusted: Option<&VerifyingKey>,
) -> SignatureStatus {
    let Some(embedded) = record.signature.as_ref() else {
        return SignatureStatus::Unsigned;
    };

    let Ok(public_key) = general_purpose::STANDARD.decode(&embedded.public_key) else {
        return SignatureStatus::Invalid;
    };
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&public_key) else {
        return SignatureStatus::Invalid;
    };
    if let Some(trusted) = trusted {
        if trusted.to_encoded_point(false).as_bytes() != public_key.as_slice() {
            return SignatureStatus::Invalid;
        }
    }

    let Ok(signature_bytes) = general_purpose::STANDARD.decode(&embedded.signature) else {
        return SignatureStatus::Invalid;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return SignatureStatus::Invalid;
    };

    let payload = canonical_payload(
        &record.id,
        record.form,
        &record.created_at,
        &record.content_hash,
    );
    if verifying_key.verify(payload.as_bytes(), &signature).is_err() {
        return SignatureStatus::Invalid;
    }
    if trusted.is_some() {
        SignatureStatus::Valid
    } else {
        SignatureStatus::Unverified
    }
}
