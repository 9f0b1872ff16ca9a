//! JSON endpoints and their OpenAPI description.

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use trialcert_core::{CertificationRecord, VerificationResult};
use utoipa::{OpenApi, ToSchema};

use crate::{run_blocking, status_code, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordRes {
    /// 32 lowercase hex characters.
    pub id: String,
    pub form: String,
    /// RFC 3339, UTC.
    pub created_at: String,
    /// SHA-256 of the certified PDF, lowercase hex.
    pub content_hash: String,
    pub pdf_ref: String,
    pub qr_ref: String,
    pub patient_code: String,
    pub patient_name: Option<String>,
    pub eligible: Option<bool>,
    pub sf36_average: Option<String>,
    pub signed: bool,
}

impl From<&CertificationRecord> for RecordRes {
    fn from(record: &CertificationRecord) -> Self {
        Self {
            id: record.id.to_string(),
            form: record.form.to_string(),
            created_at: record.created_at.to_rfc3339(),
            content_hash: record.content_hash.to_string(),
            pdf_ref: record.pdf_ref.clone(),
            qr_ref: record.qr_ref.clone(),
            patient_code: record.patient_code.clone(),
            patient_name: record.patient_name.clone(),
            eligible: record.eligible,
            sf36_average: record.sf36_average.clone(),
            signed: record.signature.is_some(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyRes {
    /// One of `valid`, `altered`, `not_found`, `artifact_missing`.
    pub status: String,
    pub id: String,
    pub stored_hash: Option<String>,
    pub current_hash: Option<String>,
    /// One of `unsigned`, `valid`, `invalid`, `unverified`.
    pub signature: String,
    pub record: Option<RecordRes>,
}

impl VerifyRes {
    fn new(id: String, result: &VerificationResult) -> Self {
        Self {
            status: result.status.as_str().to_string(),
            id,
            stored_hash: result.record.as_ref().map(|r| r.content_hash.to_string()),
            current_hash: result.current_hash.as_ref().map(|h| h.to_string()),
            signature: result.signature.as_str().to_string(),
            record: result.record.as_ref().map(RecordRes::from),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, get_record, verify_record),
    components(schemas(HealthRes, RecordRes, VerifyRes))
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
pub(crate) async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "TrialCert is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/api/records/{id}",
    params(("id" = String, Path, description = "Certificate identifier")),
    responses(
        (status = 200, description = "Certification record", body = RecordRes),
        (status = 404, description = "No record with this identifier"),
        (status = 500, description = "Internal server error")
    )
)]
/// Returns the ledger record for a certificate.
pub(crate) async fn get_record(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<RecordRes>, (StatusCode, &'static str)> {
    let service = state.service.clone();
    let found = run_blocking(move || service.find(&id))
        .await
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?;

    match found {
        Some(record) => Ok(Json(RecordRes::from(&record))),
        None => Err((StatusCode::NOT_FOUND, "Not found")),
    }
}

#[utoipa::path(
    get,
    path = "/api/verify/{id}",
    params(("id" = String, Path, description = "Certificate identifier")),
    responses(
        (status = 200, description = "Document valid or altered", body = VerifyRes),
        (status = 404, description = "Unknown certificate", body = VerifyRes),
        (status = 410, description = "Certified document missing", body = VerifyRes),
        (status = 500, description = "Internal server error")
    )
)]
/// Re-hashes the stored PDF and compares it with the ledger.
pub(crate) async fn verify_record(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<(StatusCode, Json<VerifyRes>), (StatusCode, &'static str)> {
    let service = state.service.clone();
    let lookup = id.clone();
    let result = run_blocking(move || service.verify(&lookup))
        .await
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?;

    Ok((status_code(result.status), Json(VerifyRes::new(id, &result))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialcert_core::VerificationStatus;

    #[test]
    fn openapi_lists_json_endpoints() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/health"));
        assert!(paths.contains_key("/api/records/{id}"));
        assert!(paths.contains_key("/api/verify/{id}"));
    }

    #[test]
    fn not_found_result_serializes_without_record() {
        let result = VerificationResult {
            status: VerificationStatus::NotFound,
            record: None,
            current_hash: None,
            signature: trialcert_core::SignatureStatus::Unsigned,
        };
        let body = serde_json::to_value(VerifyRes::new("abc".into(), &result)).unwrap();
        assert_eq!(body["status"], "not_found");
        assert!(body["record"].is_null());
    }
}
