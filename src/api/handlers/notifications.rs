//! `GET|POST /account/settings/notifications/`

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
    api::{context::RequestContext, error::AppError, state::AccountsState, NOTIFICATIONS_PATH},
    forms::{FormData, FormView, NotificationForm, NotificationSettingsForm},
};

pub const NOTIFICATIONS_TEMPLATE: &str = "accounts/notifications.html";

#[utoipa::path(
    method(get, post),
    path = "/account/settings/notifications/",
    responses(
        (status = 200, description = "Notification forms and their errors", body = crate::api::render::Page),
        (status = 302, description = "Every form saved, or redirect to the login page when signed out"),
        (status = 403, description = "CSRF token missing or mismatched")
    ),
    tag = "accounts"
)]
pub async fn notifications(
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

    let data = FormData::bind(&method, values);
    let options = state.options().options(user.id).await?;

    // base form first, then plugin forms in registry order
    let mut forms: Vec<Box<dyn NotificationForm>> = vec![Box::new(NotificationSettingsForm::new(
        &user,
        &options,
        data.clone(),
    ))];
    forms.extend(
        state
            .plugins()
            .notification_forms(&user, &options, data.as_ref()),
    );

    if data.is_some() {
        // validate every form so all errors are shown
        let mut all_valid = true;
        for form in &mut forms {
            all_valid &= form.is_valid();
        }
        if all_valid {
            for form in &forms {
                form.save(state.options()).await?;
            }
            info!(user_id = %user.id, forms = forms.len(), "Notification settings updated");
            return Ok(ctx.finish(found(&format!("{NOTIFICATIONS_PATH}?success=1")), config));
        }
    }

    let views: Vec<FormView> = forms.iter().map(|form| form.view()).collect();
    let context = json!({
        "forms": views,
        "page": "notifications",
        "success": success_flag(&query),
        "csrf_token": ctx.csrf_token(),
    });
    Ok(ctx.finish(
        state.renderer().render(NOTIFICATIONS_TEMPLATE, context),
        config,
    ))
}
