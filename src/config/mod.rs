pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Upper bound in seconds on one upstream request, stream included.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
            http_use_env_proxy: false,
        }
    }
}

/// Conversational search service endpoints and session scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    #[serde(default = "default_home_path")]
    pub home_path: String,
    #[serde(default = "default_conversation_path")]
    pub conversation_path: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    /// Regex with one capture group that extracts the session token from the home page.
    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub extra_cookies: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_home_path() -> String {
    "/".to_string()
}
fn default_conversation_path() -> String {
    "/api/conversation".to_string()
}
fn default_chat_path() -> String {
    "/api/chat".to_string()
}
fn default_token_pattern() -> String {
    r#""sessionToken"\s*:\s*"([^"]+)""#.to_string()
}
fn default_cookie_name() -> String {
    "session-token".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}
fn default_token_ttl_secs() -> u64 {
    600
}

impl UpstreamConfig {
    /// Upstream config pointing at `base_url` with every other field defaulted.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            home_path: default_home_path(),
            conversation_path: default_conversation_path(),
            chat_path: default_chat_path(),
            token_pattern: default_token_pattern(),
            cookie_name: default_cookie_name(),
            extra_cookies: Vec::new(),
            user_agent: default_user_agent(),
            token_ttl_secs: default_token_ttl_secs(),
            proxy: None,
        }
    }
}

/// Models exposed to clients.
///
/// `available` entries are either a bare model name or `alias:upstream_model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model")]
    pub default: String,
    #[serde(default = "default_available_models")]
    pub available: Vec<String>,
}

fn default_model() -> String {
    "search".to_string()
}
fn default_available_models() -> Vec<String> {
    vec![
        "search".to_string(),
        "search-pro:pro".to_string(),
        "search-reasoning:reasoning".to_string(),
    ]
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            available: default_available_models(),
        }
    }
}

/// Client authentication configuration. An empty key list disables the check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAuthConfig {
    #[serde(default)]
    pub allowed_keys: Vec<String>,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub client_authentication: ClientAuthConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.timeout, 180);
        assert_eq!(config.upstream.cookie_name, "session-token");
        assert_eq!(config.models.default, "search");
        assert_eq!(config.client_authentication.allowed_keys.len(), 1);
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = parse_config("upstream:\n  base_url: https://search.example.com\n").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.upstream.home_path, "/");
        assert_eq!(config.upstream.chat_path, "/api/chat");
        assert_eq!(config.upstream.token_ttl_secs, 600);
        assert_eq!(config.models.available.len(), 3);
        assert!(config.client_authentication.allowed_keys.is_empty());
        assert_eq!(config.features.log_level, "INFO");
    }

    #[test]
    fn test_missing_upstream_is_yaml_error() {
        let err = parse_config("server:\n  port: 9000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_server_config_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.runtime_worker_threads, None);
        assert_eq!(server.http_pool_idle_timeout_secs, 15);
        assert!(!server.http_use_env_proxy);
    }
}
