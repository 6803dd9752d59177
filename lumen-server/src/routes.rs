use std::sync::Arc;

use anyhow::{bail, Result};
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use lumen_core::{FailureKind, ImageService};
use serde::{Deserialize, Serialize};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, warn};

const PROMPT_REQUIRED: &str = "Prompt is required.";
const GENERATION_FAILED: &str = "Failed to generate image.";

#[derive(Deserialize)]
struct GenerateBody {
    prompt: Option<String>,
}

#[derive(Serialize)]
struct GenerateResponse {
    path: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

fn error_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Application state: the service holding the preloaded model.
#[derive(Clone)]
pub struct AppState(pub Arc<ImageService>);

/// Checks that the published image prefix is a plain route path: no parent
/// segments and nothing axum would read as a parameter or wildcard.
pub fn check_public_dir(public_dir: &str) -> Result<()> {
    for segment in public_dir.split('/') {
        if segment == ".." {
            bail!("output directory must not contain `..`, got {public_dir}");
        }
        if segment.contains(['{', '}']) || segment.starts_with([':', '*']) {
            bail!("output directory segment `{segment}` cannot be used as a route path");
        }
    }
    Ok(())
}

pub fn create_app(state: AppState) -> Result<Router> {
    let store = state.0.store();
    let public_dir = store.public_dir();
    check_public_dir(&public_dir)?;
    let images = ServeDir::new(store.output_dir());

    let router = Router::new().route("/generate", post(generate_image_handler));
    // axum refuses to nest at the root
    let router = if public_dir == "/" {
        router.fallback_service(images)
    } else {
        router.nest_service(&public_dir, images)
    };

    Ok(router.layer(TraceLayer::new_for_http()).with_state(state))
}

async fn generate_image_handler(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Response {
    let prompt = match body {
        Ok(Json(GenerateBody {
            prompt: Some(prompt),
        })) if !prompt.is_empty() => prompt,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, PROMPT_REQUIRED),
        Err(rejection) => {
            warn!("Rejected generation request: {rejection}");
            return error_response(StatusCode::BAD_REQUEST, PROMPT_REQUIRED);
        }
    };

    let service = Arc::clone(&state.0);
    let outcome = tokio::task::spawn_blocking(move || service.generate(&prompt)).await;

    match outcome {
        Ok(Ok(saved)) => Json(GenerateResponse {
            path: saved.public_path,
        })
        .into_response(),
        Ok(Err(e)) if e.kind() == FailureKind::InvalidInput => {
            error_response(StatusCode::BAD_REQUEST, PROMPT_REQUIRED)
        }
        Ok(Err(e)) => {
            error!("Error generating image: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, GENERATION_FAILED)
        }
        Err(e) => {
            error!("Generation task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, GENERATION_FAILED)
        }
    }
}
