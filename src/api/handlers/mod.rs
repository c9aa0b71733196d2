pub mod access;
pub mod health;
pub mod login;
pub mod logout;
pub mod notifications;
pub mod settings;

// common functions for the handlers
use axum::{
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::error;
use url::form_urlencoded;

/// `302 Found` to `location`.
#[must_use]
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(err) => {
            error!("Invalid redirect target '{location}': {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Accept only local absolute paths as post-login targets.
#[must_use]
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.map(str::trim).filter(|target| {
        target.starts_with('/')
            && !target.starts_with("//")
            && !target.contains('\\')
            && !target.chars().any(char::is_control)
    })
}

/// Decode a raw query string; later duplicates win.
#[must_use]
pub fn query_params(raw: Option<&str>) -> HashMap<String, String> {
    raw.map(|raw| form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// `?success=1` marks a completed save.
#[must_use]
pub fn success_flag(query: &HashMap<String, String>) -> bool {
    query.get("success").is_some_and(|value| value == "1")
}
