//! Input validation utilities.
//!
//! Checks applied to configuration values before they are embedded in certificates.

use url::Url;

use crate::{CertError, CertResult};

/// Validates the public base URL that verification links are built from, and returns it with
/// trailing slashes trimmed.
///
/// The URL is printed on every certificate and encoded in every QR code:
/// - Must parse as an absolute `http` or `https` URL with a host (and a valid port, if any)
/// - Rejects credentials, query strings and fragments
/// - Rejects whitespace and control characters anywhere in the input
///
/// # Errors
///
/// Returns `CertError::InvalidInput` if the URL is unusable.
pub fn validate_public_base_url(base_url: &str) -> CertResult<String> {
    const MAX_URL_LEN: usize = 2_048;

    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(CertError::InvalidInput("base URL cannot be empty".into()));
    }

    if trimmed.len() > MAX_URL_LEN {
        return Err(CertError::InvalidInput(format!(
            "base URL exceeds maximum length of {} characters",
            MAX_URL_LEN
        )));
    }

    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CertError::InvalidInput(
            "base URL must not contain whitespace".into(),
        ));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| CertError::InvalidInput(format!("invalid base URL {trimmed:?}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CertError::InvalidInput("base URL must start with http:// or https://".into()));
    }

    // `https:///path` parses with `path` as the host; require the authority to be written out.
    let after_scheme = &trimmed[url.scheme().len()..];
    let written_host = after_scheme
        .strip_prefix("://")
        .is_some_and(|rest| !rest.starts_with('/'));
    if !written_host || url.host_str().map_or(true, str::is_empty) {
        return Err(CertError::InvalidInput("base URL must include a host".into()));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(CertError::InvalidInput("base URL must not contain credentials".into()));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(CertError::InvalidInput(
            "base URL must not contain a query or a fragment".into(),
        ));
    }

    Ok(trimmed.to_string())
}
