use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trialcert_core::CoreConfig;

/// Main entry point for the TrialCert application
///
/// Loads `.env`, resolves configuration once, opens the ledger and artifact directory, and
/// serves the HTTP surface until Ctrl-C.
///
/// # Environment Variables
/// - `TRIALCERT_ADDR`: server address (default: "0.0.0.0:8080")
/// - `TRIALCERT_BASE_URL`: public base URL encoded in QR codes (default: the request's host)
/// - `TRIALCERT_DATA_DIR`, `TRIALCERT_CERTS_DIR`: ledger and artifact directories
/// - `TRIALCERT_SIGNING_KEY`: optional site key used to sign records
/// - `TRIALCERT_TRUSTED_CERT`: site certificate that record signatures must match
/// - `TRIALCERT_MIRROR_*`, `TRIALCERT_DOCUMENT_STORE_URL`, `TRIALCERT_OBJECT_STORE_*`: mirrors
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trialcert=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr: SocketAddr = std::env::var("TRIALCERT_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".into())
        .parse()?;

    let config = CoreConfig::from_env()?;
    tracing::info!(
        base_url = config.base_url().unwrap_or("(from request Host)"),
        data_dir = %config.data_dir().display(),
        mirrors = config.mirrors().is_enabled(),
        "configuration loaded"
    );

    let state = api_rest::AppState::open(config)?;
    let app = api_rest::router(state);

    tracing::info!("++ Starting TrialCert on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}
