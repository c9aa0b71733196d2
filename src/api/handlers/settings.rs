//! `GET|POST /account/settings/`

use axum::{
    extract::{Extension, Form, RawQuery},
    http::Method,
    response::Response,
};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tracing::info;

use super::{access::CurrentUser, found, query_params, success_flag};
use crate::{
    api::{
        context::{append_cookie, Cookie, RequestContext},
        error::AppError,
        state::{AccountsConfig, AccountsState},
        SETTINGS_PATH,
    },
    forms::{AccountInitial, AccountSettingsForm, FormData},
    storage::User,
};

pub const SETTINGS_TEMPLATE: &str = "accounts/settings.html";

#[utoipa::path(
    method(get, post),
    path = "/account/settings/",
    responses(
        (status = 200, description = "Settings page with the form and its errors", body = crate::api::render::Page),
        (status = 302, description = "Saved, or redirect to the login page when signed out"),
        (status = 403, description = "CSRF token missing or mismatched")
    ),
    tag = "accounts"
)]
pub async fn settings(
    Extension(state): Extension<Arc<AccountsState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
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

    let initial = AccountInitial {
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        language: active_language(&ctx, &user, config),
    };
    let mut form = AccountSettingsForm::new(
        user,
        FormData::bind(&method, values),
        initial,
        config.languages().to_vec(),
    );

    if form.is_valid(state.users()).await? {
        let saved = form.save(state.users()).await?;
        info!(user_id = %saved.id, "Account settings updated");

        let mut response = found(&format!("{SETTINGS_PATH}?success=1"));
        if let Some(language) = saved.locale.as_deref() {
            match ctx.session() {
                Some(session) => {
                    let mut data = session.data.clone();
                    data.locale = Some(language.to_string());
                    state.sessions().update(&session.token, &data).await?;
                }
                None => append_cookie(
                    &mut response,
                    &Cookie::new(config.language_cookie_name(), language)
                        .max_age(config.session_ttl_seconds())
                        .secure(config.cookie_secure()),
                ),
            }
        }
        return Ok(ctx.finish(response, config));
    }

    let context = json!({
        "form": form.view(),
        "page": "settings",
        "success": success_flag(&query),
        "csrf_token": ctx.csrf_token(),
    });
    Ok(ctx.finish(state.renderer().render(SETTINGS_TEMPLATE, context), config))
}

/// First offered language among the session, the locale cookie and the
/// stored preference; the configured default otherwise.
fn active_language(ctx: &RequestContext, user: &User, config: &AccountsConfig) -> String {
    [ctx.locale(), user.locale.as_deref()]
        .into_iter()
        .flatten()
        .find(|code| config.languages().iter().any(|known| known.as_str() == *code))
        .unwrap_or(config.default_language())
        .to_string()
}
