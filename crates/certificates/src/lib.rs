use rcgen::{
    CertificateParams, DistinguishedName, DnType, Ia5String, IsCa, KeyPair, KeyUsagePurpose,
    SanType, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use thiserror::Error;

/// Errors that can occur during certificate creation.
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("Failed to generate certificate: {0}")]
    GenerationError(String),
}

/// Site signing identity used to sign ledger records.
///
/// Generates a self-signed X.509 certificate over an ECDSA P-256 key. The private key is
/// emitted as PKCS#8 PEM, which is the format the record signer loads.
pub struct SiteCertificate;

impl SiteCertificate {
    /// Creates a new signing certificate for a trial site.
    ///
    /// # Arguments
    ///
    /// * `site_name` - Human-readable site or sponsor name (used as Common Name in Subject).
    /// * `site_id` - Stable site identifier, embedded as a `trialcert://site/<id>` URI SAN.
    /// * `validity_days` - Validity period starting now.
    ///
    /// # Returns
    ///
    /// A tuple of (X.509 certificate PEM, PKCS#8 private key PEM).
    ///
    /// # Errors
    ///
    /// Returns `CertificateError::GenerationError` if key or certificate generation fails.
    pub fn create(
        site_name: &str,
        site_id: &str,
        validity_days: i64,
    ) -> Result<(String, String), CertificateError> {
        let mut params = CertificateParams::default();

        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, site_name);
        params.distinguished_name = subject;

        params.is_ca = IsCa::NoCa;

        let uri = format!("trialcert://site/{}", site_id);
        let uri = Ia5String::try_from(uri)
            .map_err(|e| CertificateError::GenerationError(e.to_string()))?;
        params.subject_alt_names.push(SanType::URI(uri));

        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::ContentCommitment,
        ];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(validity_days);

        let serial: [u8; 16] = *uuid::Uuid::new_v4().as_bytes();
        params.serial_number = Some(SerialNumber::from(serial.to_vec()));

        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| CertificateError::GenerationError(e.to_string()))?;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CertificateError::GenerationError(e.to_string()))?;

        Ok((cert.pem(), key_pair.serialize_pem()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_parser::prelude::*;

    #[test]
    fn test_create_certificate() {
        let (cert_pem, key_pem) = SiteCertificate::create("Site 01", "site-01", 365).unwrap();

        assert!(cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(cert_pem.contains("END CERTIFICATE"));
        assert!(key_pem.contains("BEGIN PRIVATE KEY"));
        assert!(key_pem.contains("END PRIVATE KEY"));
    }

    #[test]
    fn test_certificate_subject_and_san() {
        let (cert_pem, _) = SiteCertificate::create("Site 02", "site-02", 30).unwrap();

        let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes()).unwrap();
        let (_, cert) = X509Certificate::from_der(&pem.contents).unwrap();

        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap();
        assert_eq!(cn, "Site 02");

        let san = cert.subject_alternative_name().unwrap().unwrap();
        let has_uri = san
            .value
            .general_names
            .iter()
            .any(|name| matches!(name, GeneralName::URI(uri) if *uri == "trialcert://site/site-02"));
        assert!(has_uri);
    }

    #[test]
    fn test_serial_numbers_differ() {
        let (a, _) = SiteCertificate::create("Site", "a", 1).unwrap();
        let (b, _) = SiteCertificate::create("Site", "a", 1).unwrap();
        assert_ne!(a, b);
    }
}
