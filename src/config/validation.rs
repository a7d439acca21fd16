use std::collections::HashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_allowed_keys(config)?;
    validate_upstream(config)?;
    validate_models(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_allowed_keys(config: &AppConfig) -> Result<(), ConfigError> {
    for key in &config.client_authentication.allowed_keys {
        if key.trim().is_empty() {
            return Err(validation_err("allowed_keys contains an empty key"));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let parsed = url::Url::parse(&upstream.base_url)
        .map_err(|err| validation_err(format!("upstream.base_url is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }

    for (field, path) in [
        ("home_path", &upstream.home_path),
        ("conversation_path", &upstream.conversation_path),
        ("chat_path", &upstream.chat_path),
    ] {
        if !path.starts_with('/') {
            return Err(validation_err(format!(
                "upstream.{field} must start with '/'"
            )));
        }
    }

    let pattern = regex_lite::Regex::new(&upstream.token_pattern).map_err(|err| {
        validation_err(format!("upstream.token_pattern is not a valid regex: {err}"))
    })?;
    if pattern.captures_len() < 2 {
        return Err(validation_err(
            "upstream.token_pattern must contain a capture group for the token",
        ));
    }

    if upstream.cookie_name.trim().is_empty() {
        return Err(validation_err("upstream.cookie_name cannot be empty"));
    }
    for cookie in &upstream.extra_cookies {
        if !cookie.contains('=') {
            return Err(validation_err(format!(
                "upstream.extra_cookies entry '{cookie}' must be name=value"
            )));
        }
    }

    if let Some(proxy) = upstream.proxy.as_deref().map(str::trim) {
        if proxy.is_empty() {
            return Err(validation_err("upstream.proxy cannot be empty when set"));
        }
        let parsed = url::Url::parse(proxy)
            .map_err(|err| validation_err(format!("upstream.proxy is not a valid URL: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(validation_err(
                "upstream.proxy must use http:// or https://",
            ));
        }
    }
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    let models = &config.models;
    if models.available.is_empty() {
        return Err(validation_err("models.available cannot be empty"));
    }

    let mut visible = HashSet::new();
    for entry in &models.available {
        if entry.trim().is_empty() {
            return Err(validation_err("model name cannot be empty"));
        }
        let alias = match entry.split_once(':') {
            Some((alias, upstream_model)) => {
                if alias.trim().is_empty() || upstream_model.trim().is_empty() {
                    return Err(validation_err(format!(
                        "Invalid alias format in '{entry}'. Both parts must not be empty."
                    )));
                }
                alias
            }
            None => entry.as_str(),
        };
        if !visible.insert(alias) {
            return Err(validation_err(format!("duplicate model entry '{alias}'")));
        }
    }

    if !visible.contains(models.default.as_str()) {
        return Err(validation_err(format!(
            "models.default '{}' is not listed in models.available",
            models.default
        )));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
