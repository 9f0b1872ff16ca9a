//! Constants used throughout the TrialCert core crate.
//!
//! Defaults for configuration values, on-disk filenames and the page geometry of certificates.

/// Default directory holding the ledger and the mirror journal.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default directory holding certificate artifacts (`<id>.pdf`, `<id>.png`).
pub const DEFAULT_CERTS_DIR: &str = "certs";

/// Default path of the consent text printed on consent certificates.
pub const DEFAULT_CONSENT_TEXT_PATH: &str = "consent_text.txt";

/// Default brand name printed in certificate headers and HTML pages.
pub const DEFAULT_BRAND: &str = "TrialCert";

/// Default object-store bucket for mirrored PDFs.
pub const DEFAULT_OBJECT_BUCKET: &str = "trial-certificates";

/// Default timeout for a single mirror request.
pub const DEFAULT_MIRROR_TIMEOUT_SECS: u64 = 10;

/// Filename of the append-only ledger inside the data directory.
pub const LEDGER_FILENAME: &str = "records.jsonl";

/// Filename of the mirror journal inside the data directory.
pub const MIRROR_JOURNAL_FILENAME: &str = "mirror_pending.jsonl";

/// Extension of the sidecar file whose OS lock serialises mirror journal writers.
pub const JOURNAL_LOCK_EXTENSION: &str = "jsonl.lock";

/// Shown in place of the consent text when the configured file is absent.
pub const CONSENT_TEXT_PLACEHOLDER: &str =
    "*** consent text missing: place the full consent text in the configured consent file. ***";

/// Brand colour (`#009EB5`) as RGB fractions.
pub const BRAND_COLOUR: (f32, f32, f32) = (0.0, 0.620, 0.710);

/// Side of the square QR code on the certificate, in millimetres.
pub const QR_SIZE_MM: f32 = 40.0;

/// Prefix of the canonical payload covered by record signatures.
pub const SIGNATURE_PAYLOAD_PREFIX: &str = "trialcert:v1";
