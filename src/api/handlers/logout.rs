//! `/account/logout/`

use axum::{extract::Extension, http::HeaderMap, response::Response};
use std::sync::Arc;
use tracing::{error, info};

use super::found;
use crate::{
    api::{
        context::{append_cookie, bearer_token, cookie_value, Cookie},
        state::{AccountsState, SESSION_COOKIE_NAME},
    },
    storage::token::is_well_formed,
};

#[utoipa::path(
    method(get, post, put, delete, patch, head, options, trace),
    path = "/account/logout/",
    responses(
        (status = 302, description = "Session cleared, redirect to the default route")
    ),
    tag = "accounts"
)]
pub async fn logout(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AccountsState>>,
) -> Response {
    let tokens = [cookie_value(&headers, SESSION_COOKIE_NAME), bearer_token(&headers)];
    for token in tokens.iter().flatten().filter(|token| is_well_formed(token)) {
        match state.sessions().destroy(token).await {
            Ok(()) => info!("Session destroyed"),
            Err(err) => error!("Failed to delete session: {err:#}"),
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let config = state.config();
    let mut response = found(config.default_redirect());
    append_cookie(
        &mut response,
        &Cookie::removal(SESSION_COOKIE_NAME)
            .http_only()
            .secure(config.cookie_secure()),
    );
    response
}
