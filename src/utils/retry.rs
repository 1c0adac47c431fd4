// 429 retry/backoff policy for the upstream Gemini client (C4, spec §4.4
// step 3): parse a retry delay from `Retry-After` or a body regex, fall
// back to a fixed default, and retry a bounded number of times.

use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// `DEFAULT_RETRY_DELAY=10s` (spec §6).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// `MAX_RETRIES=3` (spec §6): three retries after the first attempt, so
/// four upstream calls total before the client gives up.
pub const MAX_RETRIES: u32 = 3;

fn reset_after_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(reset|retry)\s+after\s+(\d+)\s*s").unwrap())
}

/// Parse a retry delay from a 429 response: (a) the `Retry-After` header
/// if it parses as a plain integer count of seconds, else (b) the first
/// regex match of `(reset|retry)\s+after\s+(\d+)\s*s` in the body, else
/// (c) `DEFAULT_RETRY_DELAY` (spec §4.4 step 3).
pub fn parse_retry_delay(retry_after_header: Option<&str>, body: &str) -> Duration {
    if let Some(header) = retry_after_header {
        if let Ok(secs) = header.trim().parse::<u64>() {
            return Duration::from_secs(secs);
        }
    }

    if let Some(caps) = reset_after_re().captures(body) {
        if let Some(secs) = caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok()) {
            return Duration::from_secs(secs);
        }
    }

    DEFAULT_RETRY_DELAY
}

/// Generic bounded retry for a fallible async operation whose error carries
/// an HTTP-style status code (OAuth token refresh, spec §5: OAuth refresh
/// gets its own 10s timeout but the same retry-on-429/5xx posture as the
/// Gemini client). `op_name` is only used for the warning log line.
///
/// Retries on `429` and `5xx`, up to `MAX_RETRIES` times, sleeping
/// `DEFAULT_RETRY_DELAY` between attempts. Any other status is returned
/// immediately without retrying.
pub async fn with_retry<F, Fut, T>(op_name: &str, mut f: F) -> std::result::Result<T, (u16, String)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, (u16, String)>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err((status, body)) => {
                let retryable = status == 429 || status >= 500;
                if !retryable || attempt >= MAX_RETRIES {
                    return Err((status, body));
                }
                attempt += 1;
                warn!(op_name, attempt, status, "retrying after failure");
                tokio::time::sleep(DEFAULT_RETRY_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_retry_after_header_wins() {
        let d = parse_retry_delay(Some("7"), "irrelevant body");
        assert_eq!(d, Duration::from_secs(7));
    }

    #[test]
    fn non_numeric_header_falls_through_to_body_regex() {
        let d = parse_retry_delay(Some("Wed, 21 Oct 2026 07:28:00 GMT"), "please retry after 3s");
        assert_eq!(d, Duration::from_secs(3));
    }

    #[test]
    fn body_regex_matches_reset_after() {
        let d = parse_retry_delay(None, "quota exceeded, reset after 12s");
        assert_eq!(d, Duration::from_secs(12));
    }

    #[test]
    fn falls_back_to_default_when_nothing_parses() {
        let d = parse_retry_delay(None, "no hint here");
        assert_eq!(d, DEFAULT_RETRY_DELAY);
    }

    #[test]
    fn regex_is_case_insensitive() {
        let d = parse_retry_delay(None, "RESET AFTER 5s");
        assert_eq!(d, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn with_retry_returns_immediately_on_success() {
        let result = with_retry("test", || async { Ok::<_, (u16, String)>(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_non_retryable_status() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry("test", || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err::<(), _>((400, "bad request".to_string())) }
        })
        .await;
        assert_eq!(result, Err((400, "bad request".to_string())));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_retries_on_429_then_succeeds() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry("test", || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err((429, "slow down".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_gives_up_after_max_retries() {
        let result: std::result::Result<(), (u16, String)> =
            with_retry("test", || async { Err((503, "down".to_string())) }).await;
        assert_eq!(result, Err((503, "down".to_string())));
    }
}
