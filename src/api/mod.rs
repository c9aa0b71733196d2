use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{any, get},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod context;
pub mod error;
pub mod handlers;
mod openapi;
pub mod render;
pub mod state;

pub use openapi::openapi;
pub use state::{AccountsConfig, AccountsState};

use handlers::{access, health, login, logout, notifications, settings};

pub const LOGIN_PATH: &str = "/account/login/";
pub const LOGOUT_PATH: &str = "/account/logout/";
pub const SETTINGS_PATH: &str = "/account/settings/";
pub const NOTIFICATIONS_PATH: &str = "/account/settings/notifications/";

/// Build the application router around `state`.
#[must_use]
pub fn app(state: Arc<AccountsState>) -> Router {
    let protected = Router::new()
        .route(SETTINGS_PATH, get(settings::settings).post(settings::settings))
        .route(
            NOTIFICATIONS_PATH,
            get(notifications::notifications).post(notifications::notifications),
        )
        .route_layer(middleware::from_fn(access::require_login));

    Router::new()
        .route(LOGIN_PATH, get(login::login).post(login::login))
        .route(LOGOUT_PATH, any(logout::logout))
        .route("/health", get(health::health).options(health::health))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<AccountsState>) -> Result<()> {
    let app = app(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
