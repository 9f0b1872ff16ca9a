use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use trialcert_certificates::SiteCertificate;
use trialcert_core::{
    hash_file, CertificationRecord, CertificationService, CoreConfig, SignatureStatus,
    VerificationStatus,
};

#[derive(Parser)]
#[command(name = "trialcert")]
#[command(about = "TrialCert certificate ledger CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a certificate by re-hashing its stored PDF
    Verify {
        /// Certificate identifier (32 hex characters)
        id: String,
    },
    /// List all certification records
    List,
    /// Show one record as JSON
    Show {
        /// Certificate identifier
        id: String,
    },
    /// Print the SHA-256 content hash of a file
    Hash {
        path: PathBuf,
    },
    /// Create a site signing certificate and private key
    Keygen {
        /// Site or sponsor name (certificate Common Name)
        #[arg(long)]
        name: String,
        /// Stable site identifier
        #[arg(long, default_value = "site-01")]
        site_id: String,
        /// Directory to write `site.crt` and `site.key` into
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 3650)]
        days: i64,
    },
    /// Retry mirror replications that previously failed
    Reconcile,
}

/// The server owns the ledger for writing; the CLI only ever reads it.
fn open_service() -> anyhow::Result<CertificationService> {
    Ok(CertificationService::open_read_only(CoreConfig::from_env()?)?)
}

fn print_record(record: &CertificationRecord) {
    println!(
        "{}  {}  {:<12}  {}  {}",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.form.as_str(),
        record.content_hash,
        record.patient_code
    );
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trialcert_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Verify { id }) => {
            let result = open_service()?.verify(&id)?;
            println!("status: {}", result.status.as_str());
            if let Some(record) = &result.record {
                println!("form: {}", record.form);
                println!("stored hash: {}", record.content_hash);
            }
            if let Some(current) = &result.current_hash {
                println!("current hash: {}", current);
            }
            println!("signature: {}", result.signature.as_str());
            if result.status != VerificationStatus::Valid
                || result.signature == SignatureStatus::Invalid
            {
                std::process::exit(1);
            }
        }
        Some(Commands::List) => {
            let records = open_service()?.list()?;
            if records.is_empty() {
                println!("No certificates found.");
            } else {
                for record in &records {
                    print_record(record);
                }
            }
        }
        Some(Commands::Show { id }) => match open_service()?.find(&id)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => {
                eprintln!("No certificate with id {}", id);
                std::process::exit(1);
            }
        },
        Some(Commands::Hash { path }) => {
            println!("{}", hash_file(&path)?);
        }
        Some(Commands::Keygen {
            name,
            site_id,
            out_dir,
            days,
        }) => {
            let (cert_pem, key_pem) = SiteCertificate::create(&name, &site_id, days)?;
            fs::create_dir_all(&out_dir)?;
            let cert_path = out_dir.join("site.crt");
            let key_path = out_dir.join("site.key");
            fs::write(&cert_path, cert_pem)?;
            fs::write(&key_path, key_pem)?;
            println!("Wrote {} and {}", cert_path.display(), key_path.display());
            println!("Set TRIALCERT_SIGNING_KEY={} to sign new records", key_path.display());
        }
        Some(Commands::Reconcile) => {
            let report = open_service()?.reconcile_mirrors()?;
            println!(
                "retried: {}, succeeded: {}, still pending: {}",
                report.retried, report.succeeded, report.still_pending
            );
        }
        None => {
            println!("Use 'trialcert --help' for commands");
        }
    }

    Ok(())
}
