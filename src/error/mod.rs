// Error taxonomy for the gateway.
//
// Every variant maps onto exactly one of the three client-facing error
// `type` strings the Anthropic wire format recognizes here: `api_error`,
// `rate_limit_error`, `authentication_error`. Anything that isn't a rate
// limit or an auth failure is an `api_error` — there is no fourth bucket.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gemini API error: {0}")]
    GeminiApi(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("OAuth token refresh failed: {0}")]
    OAuthRefresh(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Rate limit exceeded: {0}")]
    TooManyRequests(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("stream overflow")]
    StreamOverflow,

    #[error("passthrough error: {0}")]
    Passthrough(String),
}

impl ProxyError {
    /// The three-member taxonomy (spec §7): everything that is not a
    /// rate limit or an auth failure is an `api_error`.
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::OAuth(_)
            | ProxyError::InvalidCredentials(_)
            | ProxyError::TokenExpired
            | ProxyError::OAuthRefresh(_) => "authentication_error",
            ProxyError::TooManyRequests(_) => "rate_limit_error",
            _ => "api_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // Local auth failure (spec §4.4: a failed `authorize()` — no
            // usable token available locally) is a 500, not a 502: the
            // gateway itself is misconfigured, the upstream was never
            // reached.
            ProxyError::OAuth(_) | ProxyError::InvalidCredentials(_) | ProxyError::TokenExpired => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            // Unrecoverable upstream 401, after the single re-auth retry
            // (spec §4.4 step 4), surfaces as a 502: the upstream rejected
            // a token we believed was valid.
            ProxyError::OAuthRefresh(_) => StatusCode::BAD_GATEWAY,
            ProxyError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Config(_) | ProxyError::ConfigParsing(_) | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// The `{type:"error", error:{type, message}}` envelope, usable both
    /// for the axum response body and for SSE `event: error` frames.
    pub fn to_envelope(&self) -> serde_json::Value {
        json!({
            "type": "error",
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
            }
        })
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), axum::Json(self.to_envelope())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

