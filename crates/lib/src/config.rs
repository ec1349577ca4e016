//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.pdfchat/config.json`) and environment.
//! Provider credentials normally come from the environment (a local `.env` is loaded at startup).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Web server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Provider endpoint and credentials.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Assistant defaults (models offered in the UI, naming model).
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Where uploads are staged and how processing is polled.
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Simulated streaming of replies in the chat page.
    #[serde(default)]
    pub render: RenderConfig,
}

/// Server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for HTTP and WebSocket (default 8501).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    8501
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

/// Provider API settings. Both fields are overridden by the environment when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    /// API base URL. Overridden by OPENAI_BASE_URL env.
    pub base_url: Option<String>,
    /// API key. Overridden by OPENAI_API_KEY env.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    /// Model used for newly created assistants and preselected in the UI.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Models the chat page offers for "update model".
    #[serde(default = "default_available_models")]
    pub available_models: Vec<String>,
    /// Model that suggests a display name for new assistants.
    #[serde(default = "default_model")]
    pub naming_model: String,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_available_models() -> Vec<String> {
    vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            available_models: default_available_models(),
            naming_model: default_model(),
        }
    }
}

/// Upload staging directory and the processing poll schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    /// Local directory uploads are written to before forwarding (default "temp_uploads"). Never cleaned up.
    #[serde(default = "default_upload_dir")]
    pub directory: PathBuf,
    /// First wait between status checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Multiplier applied to the wait after each check (1.0 = fixed interval).
    #[serde(default = "default_poll_backoff")]
    pub poll_backoff: f64,
    /// Upper bound on the wait between checks.
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
    /// Status checks before giving up.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("temp_uploads")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_backoff() -> f64 {
    1.5
}

fn default_max_poll_interval_ms() -> u64 {
    10_000
}

fn default_max_poll_attempts() -> u32 {
    120
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            directory: default_upload_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_backoff: default_poll_backoff(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    /// Characters revealed per frame.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pause between frames.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_chunk_size() -> usize {
    10
}

fn default_interval_ms() -> u64 {
    30
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            interval_ms: default_interval_ms(),
        }
    }
}

/// Trimmed, non-empty value or None.
fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the API key: env OPENAI_API_KEY overrides config.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    let env = std::env::var("OPENAI_API_KEY").ok();
    non_empty(env.as_deref()).or_else(|| non_empty(config.openai.api_key.as_deref()))
}

/// Resolve the API base URL: env OPENAI_BASE_URL overrides config. None means the client default.
pub fn resolve_base_url(config: &Config) -> Option<String> {
    let env = std::env::var("OPENAI_BASE_URL").ok();
    non_empty(env.as_deref()).or_else(|| non_empty(config.openai.base_url.as_deref()))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Load `.env` from the working directory (if any) and drop an SSL_CERT_FILE override so the
/// HTTP client keeps its own trust store. Call once at startup before any threads are spawned.
pub fn load_env() {
    match dotenvy::dotenv() {
        Ok(path) => log::debug!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => log::debug!("no .env file found"),
        Err(e) => log::warn!("reading .env failed: {}", e),
    }
    if std::env::var_os("SSL_CERT_FILE").is_some() {
        std::env::remove_var("SSL_CERT_FILE");
        log::info!("removed SSL_CERT_FILE from environment");
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PDFCHAT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".pdfchat").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (PDFCHAT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_port_and_bind() {
        let s = ServerConfig::default();
        assert_eq!(s.port, 8501);
        assert_eq!(s.bind, "127.0.0.1");
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.assistant.default_model, "gpt-4o-mini");
        assert_eq!(
            config.assistant.available_models,
            vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]
        );
        assert_eq!(config.uploads.directory, PathBuf::from("temp_uploads"));
        assert_eq!(config.uploads.poll_interval_ms, 1000);
        assert_eq!(config.render.chunk_size, 10);
        assert_eq!(config.render.interval_ms, 30);
    }

    #[test]
    fn camel_case_keys_are_read() {
        let config: Config = serde_json::from_str(
            r#"{
                "server": { "port": 9000 },
                "openai": { "baseUrl": "http://localhost:1234/v1" },
                "uploads": { "maxPollAttempts": 3, "pollBackoff": 1.0 },
                "render": { "chunkSize": 4 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(
            config.openai.base_url.as_deref(),
            Some("http://localhost:1234/v1")
        );
        assert_eq!(config.uploads.max_poll_attempts, 3);
        assert_eq!(config.uploads.poll_backoff, 1.0);
        assert_eq!(config.render.chunk_size, 4);
    }

    #[test]
    fn non_empty_trims_and_filters() {
        assert_eq!(non_empty(Some("  sk-1 ")), Some("sk-1".to_string()));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn loopback_binds() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(!is_loopback_bind("0.0.0.0"));
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("pdfchat-missing-{}.json", uuid::Uuid::new_v4()));
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.server.port, 8501);
    }
}
