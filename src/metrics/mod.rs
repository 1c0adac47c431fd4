// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics, DISPOSITION_TOTAL, GEMINI_API_CALLS, GEMINI_API_DURATION, GEMINI_RETRIES_TOTAL,
    OAUTH_REFRESHES, OAUTH_TOKEN_EXPIRY, PASSTHROUGH_RETRIES_TOTAL, REQUESTS_TOTAL, REQUEST_DURATION, SSE_CONNECTIONS,
    SSE_EVENTS, TOKENS_TOTAL, TRANSLATION_ERRORS,
};

/// Helper to record request metrics
pub fn record_request(method: &str, endpoint: &str, status_code: u16, model: &str, duration_secs: f64) {
    REQUESTS_TOTAL.with_label_values(&[method, endpoint, &status_code.to_string(), model]).inc();
    REQUEST_DURATION.with_label_values(&[method, endpoint, &status_code.to_string()]).observe(duration_secs);
}

/// Record which fate the router (C6) chose for a request.
pub fn record_disposition(disposition: &str) {
    DISPOSITION_TOTAL.with_label_values(&[disposition]).inc();
}

/// Helper to record Gemini API call metrics
pub fn record_gemini_call(model: &str, status_code: u16, streaming: bool, duration_secs: f64) {
    GEMINI_API_CALLS.with_label_values(&[model, &status_code.to_string(), &streaming.to_string()]).inc();
    GEMINI_API_DURATION.with_label_values(&[model, &streaming.to_string()]).observe(duration_secs);
}

pub fn record_gemini_retry(reason: &str) {
    GEMINI_RETRIES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_passthrough_retry(outcome: &str) {
    PASSTHROUGH_RETRIES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record token usage
pub fn record_tokens(model: &str, input: u32, output: u32) {
    if input > 0 {
        TOKENS_TOTAL.with_label_values(&[model, "input"]).inc_by(input as f64);
    }
    if output > 0 {
        TOKENS_TOTAL.with_label_values(&[model, "output"]).inc_by(output as f64);
    }
}

/// Helper to record OAuth metrics
pub fn record_oauth_refresh(success: bool) {
    let status = if success { "success" } else { "failure" };
    OAUTH_REFRESHES.with_label_values(&[status]).inc();
}

pub fn update_oauth_expiry(seconds: i64) {
    let status = if seconds > 0 { "valid" } else { "expired" };
    OAUTH_TOKEN_EXPIRY.with_label_values(&[status]).set(seconds as f64);
}

/// Helper to record SSE events
pub fn record_sse_event(event_type: &str, model: &str) {
    SSE_EVENTS.with_label_values(&[event_type, model]).inc();
}

pub fn record_sse_connection(status: &str) {
    SSE_CONNECTIONS.with_label_values(&[status]).inc();
}

/// Helper to record translation errors
pub fn record_translation_error(direction: &str, error_type: &str) {
    TRANSLATION_ERRORS.with_label_values(&[direction, error_type]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_disposition_shows_up_in_gathered_output() {
        record_disposition("intercept");
        let metrics = gather_metrics();
        assert!(metrics.contains("disposition_total"));
        assert!(metrics.contains(r#"disposition="intercept""#));
    }

    #[test]
    fn recorded_tokens_accumulate_by_model_and_type() {
        record_tokens("gemini-test-model", 10, 5);
        record_tokens("gemini-test-model", 3, 0);
        let metrics = gather_metrics();
        assert!(metrics.contains(r#"model="gemini-test-model",type="input""#));
        assert!(metrics.contains(r#"model="gemini-test-model",type="output""#));
    }
}
