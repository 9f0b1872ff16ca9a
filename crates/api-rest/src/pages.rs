//! HTML handlers: index, questionnaire forms, submission and the public verify page.

use axum::{
    extract::{FromRequest, Multipart, Path as AxumPath, Request, State},
    http::{
        header::{CONTENT_TYPE, HOST},
        HeaderMap, StatusCode,
    },
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use trialcert_core::{Attachment, FormType, Submission};

use crate::{html, run_blocking, status_code, AppState};

const RECENT_LIMIT: usize = 20;

fn not_found(state: &AppState, what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(html::message_page(state.config.brand(), "Not found", what)),
    )
        .into_response()
}

fn internal_error(state: &AppState) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(html::message_page(
            state.config.brand(),
            "Certificate not generated",
            "An internal error occurred. Please try again.",
        )),
    )
        .into_response()
}

pub(crate) async fn index(State(state): State<AppState>) -> Response {
    let service = state.service.clone();
    match run_blocking(move || service.recent(RECENT_LIMIT)).await {
        Ok(recent) => Html(html::index_page(state.config.brand(), &recent)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list recent certificates");
            internal_error(&state)
        }
    }
}

pub(crate) async fn form_page(
    State(state): State<AppState>,
    AxumPath(form): AxumPath<String>,
) -> Response {
    let Ok(form) = form.parse::<FormType>() else {
        return not_found(&state, "Unknown questionnaire.");
    };
    Html(html::form_page(
        state.config.brand(),
        form.descriptor(),
        state.config.consent_text(),
    ))
    .into_response()
}

/// `scheme://host` the request arrived on, honouring `X-Forwarded-Proto` from a proxy.
///
/// Only used for verification links when no public base URL is configured.
pub(crate) fn request_base_url(headers: &HeaderMap) -> Option<String> {
    let host = headers.get(HOST)?.to_str().ok()?.trim();
    if host.is_empty() {
        return None;
    }
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|scheme| matches!(*scheme, "http" | "https"))
        .unwrap_or("http");
    Some(format!("{}://{}", scheme, host))
}

/// Reads a url-encoded or multipart body into a [`Submission`].
///
/// File parts become attachments (empty uploads are dropped); everything else is a field.
async fn read_submission(form: FormType, request: Request, state: &AppState) -> Result<Submission, Response> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let mut submission = Submission::new(form);
    if is_multipart {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(IntoResponse::into_response)?;
        while let Some(field) = multipart.next_field().await.map_err(IntoResponse::into_response)? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match field.file_name().map(str::to_owned) {
                Some(filename) => {
                    let bytes = field.bytes().await.map_err(IntoResponse::into_response)?;
                    if !bytes.is_empty() {
                        submission.attachments.insert(
                            name,
                            Attachment {
                                filename,
                                bytes: bytes.to_vec(),
                            },
                        );
                    }
                }
                None => {
                    let value = field.text().await.map_err(IntoResponse::into_response)?;
                    submission.fields.insert(name, value);
                }
            }
        }
    } else {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, state)
            .await
            .map_err(IntoResponse::into_response)?;
        submission.fields.extend(pairs);
    }
    Ok(submission)
}

/// Validates, certifies and redirects to the verification page.
pub(crate) async fn submit(
    State(state): State<AppState>,
    AxumPath(form): AxumPath<String>,
    request: Request,
) -> Response {
    let Ok(form) = form.parse::<FormType>() else {
        return not_found(&state, "Unknown questionnaire.");
    };
    let request_base = request_base_url(request.headers());
    let submission = match read_submission(form, request, &state).await {
        Ok(submission) => submission,
        Err(rejection) => return rejection,
    };

    let descriptor = form.descriptor();
    if let Err(error) = descriptor.validate(&submission) {
        tracing::info!(form = %form, missing = ?error.missing, invalid = ?error.invalid, "submission rejected");
        return (
            StatusCode::BAD_REQUEST,
            Html(html::validation_page(state.config.brand(), descriptor, &error)),
        )
            .into_response();
    }

    let service = state.service.clone();
    match run_blocking(move || service.certify_at(&submission, request_base.as_deref())).await {
        Ok(record) => Redirect::to(&format!("/verify/{}", record.id)).into_response(),
        Err(e) => {
            tracing::error!(form = %form, error = %e, "certificate generation failed");
            internal_error(&state)
        }
    }
}

pub(crate) async fn verify_page(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let service = state.service.clone();
    let lookup = id.clone();
    match run_blocking(move || service.verify(&lookup)).await {
        Ok(result) => (
            status_code(result.status),
            Html(html::verify_page(state.config.brand(), &id, &result)),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(id = %id, error = %e, "verification failed");
            internal_error(&state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn request_base_comes_from_host_and_forwarded_proto() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_base_url(&headers), None);

        headers.insert(HOST, HeaderValue::from_static("trials.example.net:8443"));
        assert_eq!(
            request_base_url(&headers).as_deref(),
            Some("http://trials.example.net:8443")
        );

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert_eq!(
            request_base_url(&headers).as_deref(),
            Some("https://trials.example.net:8443")
        );

        headers.insert("x-forwarded-proto", HeaderValue::from_static("gopher"));
        assert_eq!(
            request_base_url(&headers).as_deref(),
            Some("http://trials.example.net:8443")
        );
    }
}
