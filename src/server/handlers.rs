// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::error::{ProxyError, Result};
use crate::gemini::PROVIDER_TAG;
use crate::models::anthropic::MessagesRequest;
use crate::models::mapping::{classify, Disposition};
use crate::models::streaming::{ErrorData, StreamEvent};
use crate::passthrough::strip_thinking_blocks;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

/// `/metrics` (ambient stack): Prometheus text-format exposition of every
/// series recorded elsewhere in this module and in the C4/C5/C2 paths.
pub async fn metrics_handler() -> impl IntoResponse {
    ([("content-type", "text/plain; version=0.0.4")], crate::metrics::gather_metrics())
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    let (expires_in, is_expired) = state.oauth_manager.token_info().await;
    let oauth_check = if is_expired {
        overall_status = HealthStatus::Unhealthy;
        HealthCheck { status: "error".to_string(), message: "Token expired".to_string() }
    } else if expires_in < 600 {
        overall_status = HealthStatus::Degraded;
        HealthCheck { status: "warning".to_string(), message: format!("Token expires in {expires_in} seconds") }
    } else {
        HealthCheck { status: "ok".to_string(), message: format!("Valid token, expires in {expires_in} seconds") }
    };
    checks.insert("oauth_credentials".to_string(), oauth_check);

    checks.insert(
        "project_resolution".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!("Project ID: {}", state.gemini_client.project_id().unwrap_or("<none>")),
        },
    );

    checks.insert(
        "passthrough".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!(
                "{} pinned at {}",
                state.passthrough_client.upstream_host(),
                state.passthrough_client.cached_ip().get()
            ),
        },
    );

    Json(HealthResponse { status: overall_status, checks, timestamp: chrono::Utc::now().to_rfc3339() })
}

/// `/v1/messages` dispatcher (C6, spec §4.6, steps 3): the only route that
/// can choose intercept over passthrough.
pub async fn messages_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, ProxyError> {
    let started = Instant::now();
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/v1/messages").to_string();

    let req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            info!(error = %e, "(parse error) → PASSTHROUGH");
            crate::metrics::record_disposition("passthrough_parse_error");
            let response = state.passthrough_client.forward(method, &path_and_query, &headers, body, None).await;
            record_dispatch("POST", &path_and_query, &response, "unknown", started);
            return response;
        }
    };

    let response = match classify(&req.model, &state.config.mapping) {
        Disposition::Intercept { target_model } => {
            info!(
                model = %req.model,
                size_kib = body.len() as f64 / 1024.0,
                messages = req.messages.len(),
                tools = req.tools.as_ref().map(Vec::len).unwrap_or(0),
                target = %target_model,
                "INTERCEPTED"
            );
            crate::metrics::record_disposition("intercept");
            if req.is_streaming() {
                stream_messages(&state, &req, target_model).await
            } else {
                unary_messages(&state, &req, target_model).await
            }
        }
        Disposition::Passthrough => {
            info!(model = %req.model, "PASSTHROUGH");
            crate::metrics::record_disposition("passthrough");
            let retry_body = Bytes::from(strip_thinking_blocks(&body));
            state.passthrough_client.forward(method, &path_and_query, &headers, body, Some(retry_body)).await
        }
    };

    record_dispatch("POST", &path_and_query, &response, &req.model, started);
    response
}

/// Record the overall request-level metrics (spec ambient stack): status
/// code is pulled from the built response on success, or from the
/// `ProxyError`'s own mapping on failure — the client sees the same code
/// either way (spec §7).
fn record_dispatch(method: &str, endpoint: &str, response: &Result<Response>, model: &str, started: Instant) {
    let status = match response {
        Ok(r) => r.status().as_u16(),
        Err(e) => e.status_code().as_u16(),
    };
    crate::metrics::record_request(method, endpoint, status, model, started.elapsed().as_secs_f64());
}

/// Catch-all fallback (C6 spec §4.6 step 4): anything that isn't a POST to
/// `/v1/messages` is relayed to the real backend with no retry body.
pub async fn passthrough_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, ProxyError> {
    let started = Instant::now();
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/").to_string();
    info!(%method, path = %path_and_query, "METHOD URL → PASSTHROUGH");
    crate::metrics::record_disposition("passthrough");
    let response = state.passthrough_client.forward(method.clone(), &path_and_query, &headers, body, None).await;
    record_dispatch(method.as_str(), &path_and_query, &response, "unknown", started);
    response
}

async fn stream_messages(state: &AppState, req: &MessagesRequest, target_model: String) -> Result<Response> {
    let event_stream = state.gemini_client.stream(req, &target_model).await?;
    crate::metrics::record_sse_connection("opened");

    let model = req.model.clone();
    let sse_bytes = async_stream::stream! {
        futures::pin_mut!(event_stream);
        let mut saw_error = false;
        while let Some(item) = event_stream.next().await {
            match item {
                Ok(event) => {
                    crate::metrics::record_sse_event(event.event_type(), &model);
                    yield Ok::<_, std::convert::Infallible>(event.to_sse());
                }
                Err(e) => {
                    saw_error = true;
                    let error_event = StreamEvent::Error {
                        error: ErrorData { error_type: e.error_type().to_string(), message: e.to_string() },
                    };
                    crate::metrics::record_sse_event(error_event.event_type(), &model);
                    yield Ok(error_event.to_sse());
                    break;
                }
            }
        }
        crate::metrics::record_sse_connection(if saw_error { "error" } else { "closed" });
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .header("x-cmm-provider", PROVIDER_TAG)
        .body(Body::from_stream(sse_bytes))
        .map_err(|e| ProxyError::Internal(format!("failed to build streaming response: {e}")))?)
}

async fn unary_messages(state: &AppState, req: &MessagesRequest, target_model: String) -> Result<Response> {
    let response = state.gemini_client.unary(req, &target_model).await?;
    Ok((StatusCode::OK, [("x-cmm-provider", PROVIDER_TAG)], Json(response)).into_response())
}
