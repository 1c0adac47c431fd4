// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{health_handler, messages_handler, metrics_handler, passthrough_handler};
use super::middleware::{enforce_body_limit, request_id_layers};
use crate::config::AppConfig;
use crate::error::Result;
use crate::gemini::GeminiClient;
use crate::oauth::OAuthManager;
use crate::passthrough::PassthroughClient;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub gemini_client: Arc<GeminiClient>,
    pub oauth_manager: OAuthManager,
    pub passthrough_client: Arc<PassthroughClient>,
}

pub fn create_router(
    config: AppConfig,
    gemini_client: GeminiClient,
    oauth_manager: OAuthManager,
    passthrough_client: PassthroughClient,
) -> Result<Router> {
    let state = AppState {
        config,
        gemini_client: Arc::new(gemini_client),
        oauth_manager,
        passthrough_client: Arc::new(passthrough_client),
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/messages", post(messages_handler))
        .fallback(passthrough_handler)
        .layer(middleware::from_fn(enforce_body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state);

    Ok(app)
}
