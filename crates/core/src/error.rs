use trialcert_files::FilesError;

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown form type: {0}")]
    InvalidFormType(String),
    #[error("no public base URL: set TRIALCERT_BASE_URL or send a Host header")]
    MissingBaseUrl,

    #[error("failed to write artifact: {0}")]
    StorageWriteFailed(#[source] FilesError),
    #[error("failed to read artifact: {0}")]
    StorageReadFailed(#[source] FilesError),
    #[error("failed to render certificate: {0}")]
    RenderFailed(String),
    #[error(
        "generation failed and cleanup also failed (id: {id}): generate={generate_error}; cleanup={cleanup_error}"
    )]
    CleanupAfterGenerateFailed {
        id: String,
        #[source]
        generate_error: Box<CertError>,
        cleanup_error: FilesError,
    },

    #[error("failed to open ledger: {0}")]
    LedgerOpen(std::io::Error),
    #[error("failed to write ledger: {0}")]
    LedgerWrite(std::io::Error),
    #[error("failed to read ledger: {0}")]
    LedgerRead(std::io::Error),
    #[error("corrupt ledger entry at line {line}: {source}")]
    LedgerCorrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("record already exists: {0}")]
    DuplicateId(String),
    #[error("ledger lock poisoned")]
    LockPoisoned,
    #[error("{path} is locked by another process: {source}")]
    FileLocked {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger was opened read-only")]
    LedgerReadOnly,

    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record: {0}")]
    Deserialization(serde_json::Error),

    #[error("failed to read signing key: {0}")]
    SigningKeyRead(std::io::Error),
    #[error("failed to parse ECDSA private key: {0}")]
    EcdsaPrivateKeyParse(Box<dyn std::error::Error + Send + Sync>),
}

pub type CertResult<T> = std::result::Result<T, CertError>;
