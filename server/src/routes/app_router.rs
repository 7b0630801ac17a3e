use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use http::HeaderValue;
use tower_http::cors::CorsLayer;

use crate::{request_tracing, server_config::cfg, ServerState};

use super::handlers::{jobs, pipeline, webhook};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        let origins = cfg
            .settings
            .allowed_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>().unwrap())
            .collect::<Vec<_>>();

        let cors_layer = CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true);

        Router::new()
            .route("/", get(|| async { "OK" }))
            .nest(
                "/pipeline",
                Router::new()
                    .route("/import", post(pipeline::trigger_import))
                    .route("/classify", post(pipeline::trigger_classify))
                    .route("/consolidate", post(pipeline::trigger_consolidate))
                    .with_state(state.clone()),
            )
            .route("/jobs/:workspace_id", get(jobs::get_job_progress))
            .route(
                "/webhooks/aurinko",
                get(webhook::handshake).post(webhook::receive),
            )
            .layer(request_tracing::trace_layer())
            .layer(request_tracing::propagate_request_id_layer())
            .layer(request_tracing::set_request_id_layer())
            .layer(cors_layer)
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
