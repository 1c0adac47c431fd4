// Configuration data structures

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub mapping: MappingConfig,

    #[serde(default)]
    pub passthrough: PassthroughConfig,

    #[serde(default)]
    pub oauth: OAuthConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// C7 TLS listener: bind address plus the cert/key pair it terminates with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_cert_path")]
    pub cert_path: String,

    #[serde(default = "default_key_path")]
    pub key_path: String,
}

/// The single `{sourceModel, targetModel}` pair the router prefix-matches
/// against (spec §4.6): no per-model table, exactly one mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default = "default_source_model")]
    pub source_model: String,

    #[serde(default = "default_target_model")]
    pub target_model: String,
}

/// C5 passthrough target: the real Anthropic hostname plus where the
/// resolved IP is cached across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassthroughConfig {
    #[serde(default = "default_upstream_host")]
    pub upstream_host: String,

    #[serde(default = "default_ip_cache_path")]
    pub ip_cache_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,

    #[serde(default = "default_true")]
    pub auto_refresh: bool,

    #[serde(default = "default_refresh_buffer")]
    pub refresh_buffer_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Whether requests/responses use the compatibility-proxy envelope
    /// (`{model, project, user_prompt_id, request}` / `{response: ...}`).
    /// Open Question 2 (see DESIGN.md): configurable, default on.
    #[serde(default = "default_true")]
    pub wrap_internal_request: bool,

    /// GCP project id sent in the wrapped request envelope, when
    /// `wrap_internal_request` is enabled and not resolved via OAuth.
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default = "default_true")]
    pub sanitize_tokens: bool,

    /// Directory the rotated log file lives in (C8).
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Rotation threshold in bytes before a new backup is cut.
    #[serde(default = "default_log_rotate_bytes")]
    pub rotate_bytes: u64,

    /// Number of numbered backups retained (`.1` newest .. `.N` oldest).
    #[serde(default = "default_log_backups")]
    pub max_backups: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            mapping: MappingConfig::default(),
            passthrough: PassthroughConfig::default(),
            oauth: OAuthConfig::default(),
            gemini: GeminiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            source_model: default_source_model(),
            target_model: default_target_model(),
        }
    }
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self {
            upstream_host: default_upstream_host(),
            ip_cache_path: default_ip_cache_path(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            auto_refresh: true,
            refresh_buffer_seconds: default_refresh_buffer(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            wrap_internal_request: true,
            project_id: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            sanitize_tokens: true,
            log_dir: default_log_dir(),
            rotate_bytes: default_log_rotate_bytes(),
            max_backups: default_log_backups(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:443".to_string()
}

fn default_cert_path() -> String {
    home_dotdir().join("api.anthropic.com.crt").to_string_lossy().to_string()
}

fn default_key_path() -> String {
    home_dotdir().join("api.anthropic.com.key").to_string_lossy().to_string()
}

fn default_source_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_target_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_upstream_host() -> String {
    "api.anthropic.com".to_string()
}

fn default_ip_cache_path() -> String {
    home_dotdir().join("upstream_ip.txt").to_string_lossy().to_string()
}

fn default_credentials_path() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".gemini")
        .join("oauth_creds.json")
        .to_string_lossy()
        .to_string()
}

fn default_true() -> bool {
    true
}

fn default_refresh_buffer() -> i64 {
    300
}

fn default_api_base_url() -> String {
    "https://cloudcode-pa.googleapis.com/v1internal".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_dir() -> String {
    home_dotdir().to_string_lossy().to_string()
}

fn default_log_rotate_bytes() -> u64 {
    1024 * 1024
}

fn default_log_backups() -> usize {
    3
}

fn home_dotdir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".cmm-gateway")
}
