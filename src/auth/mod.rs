use axum::http::HeaderMap;
use reqwest::Url;
use thiserror::Error;


/// Header carrying the caller's Salesforce instance base URL
pub const INSTANCE_URL_HEADER: &str = "x-sfdc-instance-url";

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <salesforce_access_token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, HeaderError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(HeaderError::MissingToken)?
        .to_str()
        .map_err(|_| HeaderError::InvalidTokenFormat)?;

    parse_bearer_token(auth_header)
}

/// Extract the Salesforce instance URL from `X-Sfdc-Instance-Url`
///
/// Must be an absolute http(s) URL; a trailing slash is dropped.
pub fn extract_instance_url(headers: &HeaderMap) -> Result<String, HeaderError> {
    let value = headers
        .get(INSTANCE_URL_HEADER)
        .ok_or(HeaderError::MissingInstanceUrl)?
        .to_str()
        .map_err(|_| HeaderError::InvalidInstanceUrl)?
        .trim();

    let url = Url::parse(value).map_err(|_| HeaderError::InvalidInstanceUrl)?;
    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
        return Err(HeaderError::InvalidInstanceUrl);
    }

    Ok(value.trim_end_matches('/').to_string())
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, HeaderError> {
    // Expect "Bearer <token>"
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(HeaderError::InvalidTokenFormat);
    }

    if !parts[0].eq_ignore_ascii_case("bearer") {
        return Err(HeaderError::InvalidTokenFormat);
    }

    let token = parts[1].trim();

    if token.is_empty() {
        return Err(HeaderError::EmptyToken);
    }

    Ok(token.to_string())
}

/// Caller-supplied session header errors
#[derive(Debug, PartialEq, Clone, Error)]
pub enum HeaderError {
    #[error("Authorization token not provided")]
    MissingToken,
    /// Not "Bearer <token>" or not valid header text
    #[error("Authorization header must use Bearer scheme")]
    InvalidTokenFormat,
    #[error("Access token is empty")]
    EmptyToken,
    #[error("X-Sfdc-Instance-Url header not provided")]
    MissingInstanceUrl,
    #[error("X-Sfdc-Instance-Url must be an absolute http(s) URL")]
    InvalidInstanceUrl,
}
