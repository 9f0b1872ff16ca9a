//! # API REST
//!
//! HTTP surface for TrialCert.
//!
//! Handles:
//! - Server-rendered questionnaire forms and submissions
//! - The public verification page the QR codes point to
//! - Static certificate artifacts under `/certs`
//! - JSON endpoints with OpenAPI/Swagger documentation
//!
//! The certification core is synchronous; handlers run it on the blocking pool.

#![warn(rust_2018_idioms)]

mod api;
pub mod html;
mod pages;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use trialcert_core::{CertificationService, CoreConfig, VerificationStatus};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use api::{ApiDoc, HealthRes, RecordRes, VerifyRes};

/// Upper bound on a submission body, uploads included.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CoreConfig>,
    pub service: Arc<CertificationService>,
}

impl AppState {
    /// Opens the certification service described by `config`.
    pub fn open(config: CoreConfig) -> anyhow::Result<Self> {
        let service = CertificationService::open(config.clone())?;
        Ok(Self {
            config: Arc::new(config),
            service: Arc::new(service),
        })
    }
}

/// HTTP status for a verification outcome: altered documents are still found (200), unknown
/// ids are 404 and vanished PDFs 410.
pub(crate) fn status_code(status: VerificationStatus) -> StatusCode {
    match status {
        VerificationStatus::Valid | VerificationStatus::Altered => StatusCode::OK,
        VerificationStatus::NotFound => StatusCode::NOT_FOUND,
        VerificationStatus::ArtifactMissing => StatusCode::GONE,
    }
}

/// Runs blocking core work off the async executor.
pub(crate) async fn run_blocking<T, F>(work: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> trialcert_core::CertResult<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}

pub fn router(state: AppState) -> Router {
    let certs = ServeDir::new(state.config.certs_dir());
    Router::new()
        .route("/", get(pages::index))
        .route("/health", get(api::health))
        .route("/api/records/:id", get(api::get_record))
        .route("/api/verify/:id", get(api::verify_record))
        .route("/verify/:id", get(pages::verify_page))
        .route("/:form", get(pages::form_page))
        .route("/:form/submit", post(pages::submit))
        .nest_service("/certs", certs)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
