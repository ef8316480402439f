use crate::engine::{EngineError, InfernumEngine};
use crate::messages::InferenceRequest;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;

/// Builds the router of the model server.
///
/// * `POST /predict` runs an [`InferenceRequest`] and answers with the
///   inference result, errors included, as `200 OK`.
/// * `GET /health` reports whether the engine is busy.
pub fn router(engine: Arc<InfernumEngine>) -> Router {
    Router::new()
        .route("/", get(|| async { "Welcome to Infernum!" }))
        .route("/predict", post(post_predict))
        .route("/health", get(get_health))
        .with_state(engine)
}

async fn post_predict(
    State(engine): State<Arc<InfernumEngine>>,
    Json(payload): Json<InferenceRequest>,
) -> impl IntoResponse {
    match engine.predict(payload).await {
        Ok(result) => (StatusCode::OK, Json(json!(result))),
        Err(EngineError::Stopped) => {
            log::error!("Inference engine is not running");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": EngineError::Stopped.to_string() })),
            )
        }
    }
}

async fn get_health(State(engine): State<Arc<InfernumEngine>>) -> impl IntoResponse {
    Json(json!({ "status": engine.state().as_str() }))
}
