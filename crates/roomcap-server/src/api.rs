use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use roomcap_core::{GenerationRequest, GenerationResult};
use roomcap_suggest::{GenerateError, Generator};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "generate request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .with_state(state)
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<GenerationResult>, ApiError> {
    info!(image_url = %request.image_url, theory = %request.theory, "generate");
    let result = state.generator.generate(&request).await?;
    Ok(Json(result))
}
