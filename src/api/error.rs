use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

/// Failures that escape a handler.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("CSRF verification failed")]
    Forbidden,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Forbidden => {
                warn!("Rejected request: {self}");
                (StatusCode::FORBIDDEN, "CSRF verification failed").into_response()
            }
            Self::Internal(err) => {
                error!("Request failed: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
