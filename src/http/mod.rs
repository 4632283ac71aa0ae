use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::app::AppContext;
use crate::view::{self, WidgetPayload};

pub fn create_router(ctx: AppContext) -> Router {
    let api = Router::new().route("/widget", post(post_widget));

    Router::new()
        .route("/healthz", get(get_healthz))
        .route("/metrics", get(get_metrics))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// The service holds no state worth probing beyond being able to answer.
async fn get_healthz() -> StatusCode {
    StatusCode::OK
}

async fn get_metrics(State(ctx): State<AppContext>) -> Response {
    match ctx.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = ?err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// Render a widget from its configuration record. Render errors are reported
/// inside the payload, so a well-formed request always gets `200 OK`.
async fn post_widget(
    State(ctx): State<AppContext>,
    Json(fields): Json<Map<String, Value>>,
) -> Json<WidgetPayload> {
    Json(view::render(&ctx, &fields).await)
}
