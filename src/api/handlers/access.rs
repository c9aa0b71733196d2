//! Login requirement for the settings pages.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;
use url::form_urlencoded;

use super::found;
use crate::{
    api::{context::RequestContext, error::AppError, state::AccountsState, LOGIN_PATH},
    storage::{token::is_well_formed, User},
};

/// The authenticated user, attached to the request by [`require_login`].
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// Resolve the user from the cookie session, or failing that a bearer
/// session, and redirect anonymous requests to the login page.
/// # Errors
/// Storage failures while resolving the session or user.
pub async fn require_login(
    Extension(state): Extension<Arc<AccountsState>>,
    ctx: RequestContext,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mut user_id = ctx.session().and_then(|session| session.data.user_id);
    if user_id.is_none() {
        if let Some(token) = ctx.bearer_token().filter(|token| is_well_formed(token)) {
            user_id = state
                .sessions()
                .load(token)
                .await?
                .and_then(|data| data.user_id);
        }
    }

    let user = match user_id {
        Some(id) => state
            .users()
            .find_by_id(id)
            .await?
            .filter(|user| user.is_active),
        None => None,
    };

    let Some(user) = user else {
        debug!("Anonymous request to {}", ctx.path_and_query());
        let next: String = form_urlencoded::byte_serialize(ctx.path_and_query().as_bytes()).collect();
        let location = format!("{LOGIN_PATH}?next={next}");
        return Ok(ctx.finish(found(&location), state.config()));
    };

    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}
