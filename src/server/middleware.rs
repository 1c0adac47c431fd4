// HTTP middleware
// Author: kelexine (https://github.com/kelexine)

use crate::error::ProxyError;
use axum::extract::Request;
use axum::http::header::CONTENT_LENGTH;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// `MAX_BODY_SIZE=10 MiB` (spec §6, §4.7): the listener "enforces
/// `Content-Length` ≤ `MAX_BODY_SIZE`" before dispatch, so an oversized body
/// never reaches a handler — it gets the same `{type:"error", error:{...}}`
/// envelope every other client-facing error uses (spec §4.6 step 1, §7)
/// instead of a bare, empty 413.
const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

/// Create request ID layers for the application
pub fn request_id_layers() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::x_request_id(MakeRequestUuid),
        PropagateRequestIdLayer::x_request_id(),
    )
}

/// Reject a request up front when its declared `Content-Length` exceeds
/// `MAX_BODY_SIZE`, returning the proxy error envelope rather than letting
/// the body be read at all (spec §4.7).
pub async fn enforce_body_limit(req: Request, next: Next) -> Response {
    if content_length_exceeds(req.headers(), MAX_BODY_SIZE) {
        return ProxyError::PayloadTooLarge.into_response();
    }

    next.run(req).await
}

fn content_length_exceeds(headers: &axum::http::HeaderMap, max: u64) -> bool {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|len| len > max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn headers_with_content_length(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, value.parse().unwrap());
        headers
    }

    #[test]
    fn under_limit_is_allowed() {
        assert!(!content_length_exceeds(&headers_with_content_length("1024"), MAX_BODY_SIZE));
    }

    #[test]
    fn exactly_at_limit_is_allowed() {
        assert!(!content_length_exceeds(&headers_with_content_length(&MAX_BODY_SIZE.to_string()), MAX_BODY_SIZE));
    }

    #[test]
    fn over_limit_is_rejected() {
        let over = (MAX_BODY_SIZE + 1).to_string();
        assert!(content_length_exceeds(&headers_with_content_length(&over), MAX_BODY_SIZE));
    }

    #[test]
    fn missing_content_length_is_allowed() {
        assert!(!content_length_exceeds(&HeaderMap::new(), MAX_BODY_SIZE));
    }
}
