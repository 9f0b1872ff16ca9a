//! Standalone REST server binary.
//!
//! ## Purpose
//! Runs the HTTP surface on its own, without the workspace runner's `.env` handling.
//!
//! ## Intended use
//! Useful in development when iterating on pages or the JSON API. Production deployments run
//! the workspace's `trialcert-run` binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trialcert_core::CoreConfig;

/// # Environment Variables
/// - `TRIALCERT_REST_ADDR`: Server address (default: "0.0.0.0:8080")
/// - All `TRIALCERT_*` variables read by [`CoreConfig::from_env`]
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the data directories cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("trialcert_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("TRIALCERT_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let state = api_rest::AppState::open(CoreConfig::from_env()?)?;

    tracing::info!("-- Starting TrialCert REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, api_rest::router(state)).await?;

    Ok(())
}
