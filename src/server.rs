use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    extract::State,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::{ApiKeyGuard, require_api_key},
    config::AppConfig,
    error::ServiceError,
    model::{GenerationRequest, GenerationResponse, LanguageModel, ModelMetadata, ModelService},
};

pub struct AppState<M> {
    pub service: Arc<ModelService<M>>,
}

impl<M> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

pub fn build_router<M>(config: Arc<AppConfig>, service: Arc<ModelService<M>>) -> Router
where
    M: LanguageModel + 'static,
{
    let guard = Arc::new(ApiKeyGuard::new(config.server_api_key.clone()));
    if guard.is_enabled() {
        info!("x-api-key authentication enabled");
    }

    let state = AppState { service };

    let protected = Router::new()
        .route("/generate", post(generate::<M>))
        .route("/metadata", get(metadata::<M>))
        .route_layer(middleware::from_fn_with_state(guard, require_api_key));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn generate<M: LanguageModel + 'static>(
    State(state): State<AppState<M>>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<GenerationResponse>, ServiceError> {
    let response = state.service.generate(request).await?;
    Ok(Json(response))
}

async fn metadata<M: LanguageModel + 'static>(
    State(state): State<AppState<M>>,
) -> Json<ModelMetadata> {
    Json(state.service.metadata())
}
