// Upstream Gemini Client (C4, spec §4.4): two entry points, `stream` and
// `unary`, that translate an Anthropic request, forward it to the
// upstream Gemini-compatible endpoint, and apply the 429/401 retry and
// re-auth rules on the initial connect. Once a stream is open, bytes flow
// through unmodified — there is no mid-stream retry (spec §9 open
// question: the thinking-signature retry only ever applies to C5).

use super::{ProjectResolutionRequest, ProjectResolutionResponse};
use crate::config::GeminiConfig;
use crate::error::{ProxyError, Result};
use crate::gemini::sse::SseFramer;
use crate::models::anthropic::{MessagesRequest, MessagesResponse};
use crate::models::gemini::{GenerateContentRequest, GeminiStreamChunk, InternalApiRequest};
use crate::models::streaming::StreamEvent;
use crate::oauth::Authorizer;
use crate::translation::request::anthropic_to_gemini;
use crate::translation::response::translate_response;
use crate::translation::streaming::StreamTranslator;
use crate::utils::ids::new_message_id;
use crate::utils::retry::{parse_retry_delay, MAX_RETRIES};
use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Streaming upstream timeout (spec §6): `TIMEOUT_STREAMING=300_000 ms`.
const TIMEOUT_STREAMING: Duration = Duration::from_secs(300);
/// Non-streaming upstream timeout (spec §6): `TIMEOUT_NON_STREAMING=120_000 ms`.
const TIMEOUT_NON_STREAMING: Duration = Duration::from_secs(120);
/// Cap on a buffered 429 error body before regex-scanning it (spec §6).
const MAX_ERROR_BODY: usize = 8 * 1024;
/// Cap on a buffered non-streaming response body (spec §6).
const MAX_RESPONSE_BODY: usize = 10 * 1024 * 1024;
/// Excerpt length kept for a non-200/non-429 error body in logs (spec §4.4 step 5).
const ERROR_LOG_EXCERPT: usize = 200;

/// `x-cmm-provider` header value stamped on every intercepted response
/// (spec §6).
pub const PROVIDER_TAG: &str = "gemini-cmm";

pub struct GeminiClient {
    http_client: Client,
    config: GeminiConfig,
    authorizer: Arc<dyn Authorizer>,
    project_id: Option<String>,
}

impl GeminiClient {
    /// Build the client. When `wrap_internal_request` is set and no
    /// `project_id` is configured, resolve one via `loadCodeAssist` up
    /// front — this is the one piece of Google-specific bootstrapping the
    /// compatibility-proxy envelope needs; it has nothing to do with the
    /// per-request retry/auth rules below.
    pub async fn new(config: GeminiConfig, authorizer: Arc<dyn Authorizer>) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to create Gemini HTTP client: {e}")))?;

        let project_id = if config.wrap_internal_request && config.project_id.is_none() {
            Some(Self::resolve_project_id(&http_client, &config.api_base_url, authorizer.as_ref()).await?)
        } else {
            config.project_id.clone()
        };

        Ok(Self { http_client, config, authorizer, project_id })
    }

    async fn resolve_project_id(client: &Client, base_url: &str, authorizer: &dyn Authorizer) -> Result<String> {
        let url = format!("{base_url}:loadCodeAssist");
        let token = authorizer.authorize().await?;

        let response = client
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .json(&ProjectResolutionRequest::default())
            .send()
            .await
            .map_err(|e| ProxyError::OAuth(format!("loadCodeAssist request failed: {e}")))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::OAuth(format!("loadCodeAssist failed: {body}")));
        }

        let parsed: ProjectResolutionResponse =
            response.json().await.map_err(|e| ProxyError::OAuth(format!("invalid loadCodeAssist response: {e}")))?;

        parsed.cloudaicompanion_project.ok_or_else(|| {
            ProxyError::OAuth(
                "no Cloud AI Companion project resolved; set gemini.project_id explicitly".to_string(),
            )
        })
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    fn request_body(&self, gemini_req: GenerateContentRequest, target_model: &str) -> Result<String> {
        if self.config.wrap_internal_request {
            let wrapped = InternalApiRequest {
                model: target_model.to_string(),
                project: self.project_id.clone(),
                user_prompt_id: Some(format!("req_{}", uuid::Uuid::new_v4().simple())),
                request: gemini_req,
            };
            serde_json::to_string(&wrapped)
        } else {
            serde_json::to_string(&gemini_req)
        }
        .map_err(|e| ProxyError::Internal(format!("failed to serialize Gemini request: {e}")))
    }

    /// Unwrap the parsed event per the compatibility-proxy envelope
    /// policy (spec §4.4 step 6, §9 open question 2) and deserialize it
    /// into a typed `GeminiStreamChunk`. Deserialize failures are logged
    /// and dropped — they behave like a malformed SSE block, not a fatal
    /// stream error.
    fn unwrap_chunk(&self, value: serde_json::Value) -> Option<GeminiStreamChunk> {
        let value = if self.config.wrap_internal_request {
            value.get("response").cloned().unwrap_or(value)
        } else {
            value
        };
        match serde_json::from_value(value) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                warn!(error = %e, "unparseable Gemini stream chunk, skipping");
                None
            }
        }
    }

    /// Issue the HTTP POST, handling the 429 backoff and single 401
    /// re-auth on the initial connect (spec §4.4 steps 3–5). Returns the
    /// final successful `reqwest::Response` or a client-facing error.
    async fn post_with_retries(&self, url: &str, body: String, timeout: Duration, target_model: &str) -> Result<reqwest::Response> {
        let mut retries = 0u32;
        let mut reauthed = false;

        loop {
            let token = self.authorizer.authorize().await?;

            let response = self
                .http_client
                .post(url)
                .timeout(timeout)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {token}"))
                .header("X-Model", target_model)
                .body(body.clone())
                .send()
                .await
                .map_err(|e| ProxyError::GeminiApi(format!("connection error: {e}")))?;

            match response.status() {
                StatusCode::OK => return Ok(response),

                StatusCode::TOO_MANY_REQUESTS => {
                    if retries >= MAX_RETRIES {
                        return Err(ProxyError::TooManyRequests("rate limit retries exhausted".to_string()));
                    }
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let body_excerpt = read_capped_body(response, MAX_ERROR_BODY).await;
                    let delay = parse_retry_delay(retry_after.as_deref(), &body_excerpt);
                    retries += 1;
                    warn!(attempt = retries, delay_secs = delay.as_secs(), "Gemini 429, backing off");
                    crate::metrics::record_gemini_retry("rate_limit");
                    tokio::time::sleep(delay).await;
                }

                StatusCode::UNAUTHORIZED => {
                    if reauthed {
                        return Err(ProxyError::OAuthRefresh("unrecoverable upstream 401".to_string()));
                    }
                    reauthed = true;
                    self.authorizer.invalidate().await;
                    debug!("Gemini 401, invalidated token and retrying once");
                    crate::metrics::record_gemini_retry("reauth");
                }

                other => {
                    let excerpt = read_capped_body(response, ERROR_LOG_EXCERPT).await;
                    return Err(ProxyError::GeminiApi(format!("HTTP {other}: {excerpt}")));
                }
            }
        }
    }

    /// `stream(anthReq, targetModel)` (spec §4.4): translate, connect, and
    /// return a stream of already-translated Anthropic `StreamEvent`s.
    pub async fn stream(
        &self,
        anth_req: &MessagesRequest,
        target_model: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
        let gemini_req = anthropic_to_gemini(anth_req)?;
        let body = self.request_body(gemini_req, target_model)?;
        let url = format!("{}:streamGenerateContent?alt=sse", self.config.api_base_url);

        let started = std::time::Instant::now();
        let response = self.post_with_retries(&url, body, TIMEOUT_STREAMING, target_model).await?;
        crate::metrics::record_gemini_call(target_model, response.status().as_u16(), true, started.elapsed().as_secs_f64());

        let message_id = new_message_id();
        let model = anth_req.model.clone();
        let wrap_internal_request = self.config.wrap_internal_request;
        let byte_stream = response.bytes_stream();

        // Local unwrap closure avoids capturing `self` (and its non-'static
        // borrows) into the generator.
        let unwrap_value = move |value: serde_json::Value| -> Option<GeminiStreamChunk> {
            let value = if wrap_internal_request { value.get("response").cloned().unwrap_or(value) } else { value };
            serde_json::from_value(value).ok()
        };

        let stream = async_stream::stream! {
            let mut framer = SseFramer::new();
            let mut translator = StreamTranslator::new(message_id, model);
            futures::pin_mut!(byte_stream);

            while let Some(next) = byte_stream.next().await {
                let bytes = match next {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(ProxyError::GeminiApi(format!("stream read error: {e}")));
                        return;
                    }
                };
                let text = String::from_utf8_lossy(&bytes).into_owned();
                let values = match framer.feed(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                for value in values {
                    let Some(chunk) = unwrap_value(value) else { continue };
                    match translator.process_chunk(chunk) {
                        Ok(events) => for ev in events { yield Ok(ev); },
                        Err(e) => { yield Err(e); return; }
                    }
                }
            }

            for value in framer.flush() {
                let Some(chunk) = unwrap_value(value) else { continue };
                match translator.process_chunk(chunk) {
                    Ok(events) => for ev in events { yield Ok(ev); },
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// `unary(anthReq, targetModel)` (spec §4.4): the non-streaming path.
    /// The entire body is buffered (≤ `MAX_RESPONSE_BODY`), parsed as
    /// JSON, and converted via `gemini_response_to_anthropic`.
    pub async fn unary(&self, anth_req: &MessagesRequest, target_model: &str) -> Result<MessagesResponse> {
        let gemini_req = anthropic_to_gemini(anth_req)?;
        let body = self.request_body(gemini_req, target_model)?;
        let url = format!("{}:generateContent", self.config.api_base_url);

        let started = std::time::Instant::now();
        let response = self.post_with_retries(&url, body, TIMEOUT_NON_STREAMING, target_model).await?;
        crate::metrics::record_gemini_call(target_model, response.status().as_u16(), false, started.elapsed().as_secs_f64());
        let body_text = read_capped_body(response, MAX_RESPONSE_BODY).await;

        let raw: serde_json::Value =
            serde_json::from_str(&body_text).map_err(|e| ProxyError::GeminiApi(format!("response parsing error: {e}")))?;

        let chunk = self
            .unwrap_chunk(raw)
            .ok_or_else(|| ProxyError::GeminiApi("response parsing error: unrecognized chunk shape".to_string()))?;

        info!(model = %anth_req.model, "unary Gemini call complete");
        translate_response(chunk, &anth_req.model)
    }
}

/// Read a response body, truncated at `cap` bytes. Used both for the
/// small 429/error excerpts and the larger non-streaming response cap —
/// the streaming path never buffers a full body.
async fn read_capped_body(response: reqwest::Response, cap: usize) -> String {
    let mut buf = Vec::with_capacity(cap.min(64 * 1024));
    let mut stream = response.bytes_stream();
    while let Some(next) = stream.next().await {
        let Ok(bytes) = next else { break };
        let remaining = cap.saturating_sub(buf.len());
        if remaining == 0 {
            break;
        }
        let take = remaining.min(bytes.len());
        buf.extend_from_slice(&bytes[..take]);
        if buf.len() >= cap {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_resolution_request_has_expected_metadata() {
        let request = ProjectResolutionRequest::default();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["metadata"]["ideType"], "GEMINI_CLI");
        assert_eq!(json["metadata"]["platform"], "PLATFORM_UNSPECIFIED");
        assert_eq!(json["metadata"]["pluginType"], "GEMINI");
    }
}
