//! `GET|POST /account/login/`

use axum::{
    extract::{Extension, Form, RawQuery},
    http::Method,
    response::Response,
};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, warn};

use super::{found, query_params, safe_next};
use crate::{
    api::{
        context::{append_cookie, Cookie, RequestContext},
        error::AppError,
        state::{AccountsState, SESSION_COOKIE_NAME, TEST_COOKIE_NAME, TEST_COOKIE_VALUE},
    },
    forms::{AuthenticationForm, FormData},
    storage::SessionData,
};

pub const LOGIN_TEMPLATE: &str = "accounts/login.html";

#[utoipa::path(
    method(get, post),
    path = "/account/login/",
    responses(
        (status = 200, description = "Login page with the form and its errors", body = crate::api::render::Page),
        (status = 302, description = "Signed in, redirect to `next` or the default route"),
        (status = 403, description = "CSRF token missing or mismatched")
    ),
    tag = "accounts"
)]
pub async fn login(
    Extension(state): Extension<Arc<AccountsState>>,
    ctx: RequestContext,
    method: Method,
    RawQuery(query): RawQuery,
    form: Option<Form<HashMap<String, String>>>,
) -> Result<Response, AppError> {
    let query = query_params(query.as_deref());
    let values = form.map(|Form(values)| values);
    if method == Method::POST {
        ctx.verify_csrf(values.as_ref())?;
    }
    let config = state.config();

    let data = FormData::bind(&method, values);
    let posted_next = data
        .as_ref()
        .and_then(|data| data.get("next"))
        .map(str::to_string);
    let mut form = AuthenticationForm::new(data);

    if form.is_valid(state.users()).await? {
        if let Some(user) = form.user() {
            // fresh session, the old token must not survive a login
            let mut session = SessionData::for_user(user.id);
            if let Some(previous) = ctx.session() {
                session.locale.clone_from(&previous.data.locale);
                state.sessions().destroy(&previous.token).await?;
            }
            let token = state.sessions().create(&session, config.session_ttl()).await?;
            if let Err(err) = state.users().record_login(user.id).await {
                error!(user_id = %user.id, "Failed to record login: {err:#}");
            }

            info!(user_id = %user.id, "User logged in");

            let target = safe_next(posted_next.as_deref()).unwrap_or(config.default_redirect());
            let mut response = found(target);
            append_cookie(
                &mut response,
                &Cookie::new(SESSION_COOKIE_NAME, &token)
                    .max_age(config.session_ttl_seconds())
                    .http_only()
                    .secure(config.cookie_secure()),
            );
            return Ok(ctx.finish(response, config));
        }
    }

    if form.is_bound() {
        warn!("Failed login attempt");
    }

    // cookie support probe
    if let Some(session) = ctx.session() {
        if !session.data.test_cookie {
            let mut data = session.data.clone();
            data.test_cookie = true;
            state.sessions().update(&session.token, &data).await?;
        }
    }

    let next = posted_next.or_else(|| query.get("next").cloned()).unwrap_or_default();
    let context = json!({
        "form": form.view(),
        "next": next,
        "csrf_token": ctx.csrf_token(),
    });

    let mut response = state.renderer().render(LOGIN_TEMPLATE, context);
    append_cookie(
        &mut response,
        &Cookie::new(TEST_COOKIE_NAME, TEST_COOKIE_VALUE).secure(config.cookie_secure()),
    );
    Ok(ctx.finish(response, config))
}
