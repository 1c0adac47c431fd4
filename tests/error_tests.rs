// Error handling tests
// Author: kelexine (https://github.com/kelexine)

use gem2claude::error::ProxyError;

#[test]
fn test_error_display_messages() {
    let errors = vec![
        ProxyError::OAuth("Token failed".to_string()),
        ProxyError::GeminiApi("API error".to_string()),
        ProxyError::Translation("Translation failed".to_string()),
        ProxyError::InvalidRequest("Bad request".to_string()),
        ProxyError::TooManyRequests("Rate limited".to_string()),
        ProxyError::PayloadTooLarge,
        ProxyError::StreamOverflow,
    ];

    for error in errors {
        let display = format!("{}", error);
        assert!(!display.is_empty(), "Error should have display message");
    }
}

#[test]
fn test_invalid_request_error() {
    let error = ProxyError::InvalidRequest("Missing model field".to_string());
    assert!(format!("{}", error).contains("Missing model field"));
}

#[test]
fn test_rate_limit_error() {
    let error = ProxyError::TooManyRequests("Quota exceeded".to_string());
    assert!(format!("{}", error).contains("Quota exceeded"));
    assert_eq!(error.error_type(), "rate_limit_error");
}

#[test]
fn test_gemini_api_error() {
    let error = ProxyError::GeminiApi("Connection refused".to_string());
    assert!(format!("{}", error).contains("Connection refused"));
    assert_eq!(error.error_type(), "api_error");
}

#[test]
fn test_oauth_error() {
    let error = ProxyError::OAuth("Token refresh failed".to_string());
    assert!(format!("{}", error).contains("Token refresh failed"));
    assert_eq!(error.error_type(), "authentication_error");
}

#[test]
fn test_translation_error() {
    let error = ProxyError::Translation("Invalid content block".to_string());
    assert!(format!("{}", error).contains("Invalid content block"));
}

#[test]
fn test_payload_too_large_error() {
    let error = ProxyError::PayloadTooLarge;
    assert_eq!(error.status_code(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn test_error_envelope_shape() {
    let error = ProxyError::TooManyRequests("slow down".to_string());
    let envelope = error.to_envelope();
    assert_eq!(envelope["type"], "error");
    assert_eq!(envelope["error"]["type"], "rate_limit_error");
    assert_eq!(envelope["error"]["message"], "Rate limit exceeded: slow down");
}

#[test]
fn test_local_auth_failure_is_500() {
    // A failed local authorize() (spec §4.4) never reached the upstream.
    for error in [
        ProxyError::OAuth("no token available".to_string()),
        ProxyError::InvalidCredentials("missing credentials file".to_string()),
        ProxyError::TokenExpired,
    ] {
        assert_eq!(error.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.error_type(), "authentication_error");
    }
}

#[test]
fn test_unrecoverable_upstream_401_is_502() {
    let error = ProxyError::OAuthRefresh("unrecoverable upstream 401".to_string());
    assert_eq!(error.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    assert_eq!(error.error_type(), "authentication_error");
}
