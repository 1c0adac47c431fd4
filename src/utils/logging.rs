// Structured logging with token sanitization
// Author: kelexine (https://github.com/kelexine)

use crate::config::LoggingConfig;
use crate::error::Result;
use crate::utils::filelog::RollingFileMakeWriter;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the process-wide subscriber: a stderr/stdout layer plus the
/// C8 append-only rotating file sink (spec §4.8). File-sink setup failures
/// are logged to stderr and otherwise ignored — observability must never
/// block startup or request handling.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_path = Path::new(&config.log_dir).join("gateway.log");
    let file_writer = RollingFileMakeWriter::new(&file_path, config.rotate_bytes, config.max_backups)
        .map_err(|e| {
            eprintln!("warning: could not open log file {}: {e}", file_path.display());
            e
        })
        .ok();

    let console_json = config.format.as_str() == "json";

    let registry = tracing_subscriber::registry().with(env_filter);

    match (console_json, file_writer) {
        (true, Some(fw)) => registry
            .with(tracing_subscriber::fmt::layer().json())
            .with(tracing_subscriber::fmt::layer().json().with_writer(fw).with_ansi(false))
            .init(),
        (true, None) => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        (false, Some(fw)) => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .with(tracing_subscriber::fmt::layer().with_writer(fw).with_ansi(false))
            .init(),
        (false, None) => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }

    Ok(())
}

/// Sanitize sensitive data from strings (access tokens, refresh tokens)
pub fn sanitize(input: &str) -> String {
    let mut result = input.to_string();
    
    // Replace access tokens (ya29.*)
    if let Some(pos) = result.find("ya29.") {
        let start = pos;
        // Find end of token (whitespace, quote, or end of string)
        let end = result[start..].find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .map(|i| start + i)
            .unwrap_or(result.len());
        result.replace_range(start..end, "[REDACTED_ACCESS_TOKEN]");
    }
    
    // Replace refresh tokens (1//0*)
    if let Some(pos) = result.find("1//0") {
        let start = pos;
        // Find end of token (whitespace, quote, or end of string)
        let end = result[start..].find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .map(|i| start + i)
            .unwrap_or(result.len());
        result.replace_range(start..end, "[REDACTED_REFRESH_TOKEN]");
    }
    
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_access_token() {
        let input = "Authorization: Bearer ya29.a0AfH6SMC...";
        let output = sanitize(input);
        assert!(output.contains("[REDACTED_ACCESS_TOKEN"));
        assert!(!output.contains("ya29.a0AfH6SMC"));
    }

    #[test]
    fn test_sanitize_refresh_token() {
        let input = "refresh_token: 1//01S6LICZta2ee...";
        let output = sanitize(input);
        assert!(output.contains("[REDACTED_REFRESH_TOKEN"));
        assert!(!output.contains("1//01S6LICZta2ee"));
    }
}
