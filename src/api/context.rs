//! Per-request context shared by the account handlers.
//!
//! The context is resolved once per request and cached in the request
//! extensions, so the login middleware and the handler see the same session
//! and the same CSRF token.

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, Uri,
    },
    response::Response,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error};

use super::{
    error::AppError,
    state::{AccountsConfig, AccountsState, CSRF_COOKIE_NAME, SESSION_COOKIE_NAME},
};
use crate::storage::{
    token::{generate_token, is_well_formed},
    SessionData,
};

pub const CSRF_FIELD: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// A session presented through the session cookie.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub data: SessionData,
}

#[derive(Clone, Debug)]
pub struct RequestContext {
    session: Option<Session>,
    bearer_token: Option<String>,
    csrf_token: String,
    csrf_issued: bool,
    csrf_header: Option<String>,
    locale_cookie: Option<String>,
    path_and_query: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<Self>() {
            return Ok(ctx.clone());
        }
        let state = parts
            .extensions
            .get::<Arc<AccountsState>>()
            .cloned()
            .ok_or_else(|| anyhow!("accounts state is not installed"))?;

        let ctx = Self::resolve(&state, &parts.headers, &parts.uri).await?;
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

impl RequestContext {
    async fn resolve(
        state: &AccountsState,
        headers: &HeaderMap,
        uri: &Uri,
    ) -> anyhow::Result<Self> {
        let session_token =
            cookie_value(headers, SESSION_COOKIE_NAME).filter(|token| is_well_formed(token));
        let session = match session_token {
            Some(token) => state
                .sessions()
                .load(&token)
                .await?
                .map(|data| Session { token, data }),
            None => None,
        };

        let (csrf_token, csrf_issued) =
            match cookie_value(headers, CSRF_COOKIE_NAME).filter(|token| is_well_formed(token)) {
                Some(token) => (token, false),
                None => (generate_token()?, true),
            };

        let csrf_header = headers
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            session,
            bearer_token: bearer_token(headers),
            csrf_token,
            csrf_issued,
            csrf_header,
            locale_cookie: cookie_value(headers, state.config().language_cookie_name()),
            path_and_query: uri
                .path_and_query()
                .map_or_else(|| uri.path().to_string(), ToString::to_string),
        })
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    #[must_use]
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    #[must_use]
    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }

    /// Requested locale: the session's choice first, then the locale cookie.
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|session| session.data.locale.as_deref())
            .or(self.locale_cookie.as_deref())
    }

    /// Double-submit check for a `POST`: the submitted token must equal the
    /// one in the CSRF cookie. A token issued for this very request never
    /// matches, since the client could not have seen it.
    /// # Errors
    /// [`AppError::Forbidden`] when the token is missing or different.
    pub fn verify_csrf(
        &self,
        submitted: Option<&HashMap<String, String>>,
    ) -> Result<(), AppError> {
        let candidate = submitted
            .and_then(|values| values.get(CSRF_FIELD))
            .or(self.csrf_header.as_ref());

        match candidate {
            Some(token) if !self.csrf_issued && *token == self.csrf_token => Ok(()),
            _ => {
                debug!("CSRF token missing or mismatched for {}", self.path_and_query);
                Err(AppError::Forbidden)
            }
        }
    }

    /// Attach the CSRF cookie when this request issued a new token.
    #[must_use]
    pub fn finish(&self, mut response: Response, config: &AccountsConfig) -> Response {
        if self.csrf_issued {
            let cookie = Cookie::new(CSRF_COOKIE_NAME, &self.csrf_token)
                .max_age(config.session_ttl_seconds())
                .secure(config.cookie_secure());
            append_cookie(&mut response, &cookie);
        }
        response
    }
}

/// `Set-Cookie` value builder.
#[derive(Clone, Debug)]
pub struct Cookie<'a> {
    name: &'a str,
    value: &'a str,
    max_age: Option<u64>,
    http_only: bool,
    secure: bool,
}

impl<'a> Cookie<'a> {
    #[must_use]
    pub fn new(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            value,
            max_age: None,
            http_only: false,
            secure: false,
        }
    }

    /// Expire `name` immediately.
    #[must_use]
    pub fn removal(name: &'a str) -> Self {
        Self::new(name, "").max_age(0)
    }

    #[must_use]
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// # Errors
    /// Fails when the name or value contains bytes not allowed in a header.
    pub fn header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{}={}; Path=/; SameSite=Lax", self.name, self.value);
        if let Some(max_age) = self.max_age {
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

/// Append a `Set-Cookie` header, keeping any already present.
pub fn append_cookie(response: &mut Response, cookie: &Cookie<'_>) {
    match cookie.header_value() {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build cookie '{}': {err}", cookie.name),
    }
}

/// Value of the cookie `name`, searching every `Cookie` header.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
}

/// Token from an `Authorization: Bearer` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
