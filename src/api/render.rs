//! Page rendering seam.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Body produced by [`JsonRenderer`].
#[derive(ToSchema, Serialize, Debug)]
pub struct Page {
    template: String,
    #[schema(value_type = Object)]
    context: Value,
}

pub trait Renderer: Send + Sync {
    /// Render `template` with `context` as a complete 200 response.
    fn render(&self, template: &str, context: Value) -> Response;
}

/// Hands the template name and context to a separate frontend as JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, template: &str, context: Value) -> Response {
        let page = Page {
            template: template.to_string(),
            context,
        };
        (StatusCode::OK, Json(page)).into_response()
    }
}
