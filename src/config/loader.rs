//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{AppConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "EDGE_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Env { key: String, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build the startup configuration: file (or defaults), then `EDGE_*`
/// environment overrides, then validation.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `EDGE_<SECTION>_<FIELD>` overrides, e.g. `EDGE_HTTP_SERVER_PORT=9000`.
///
/// Unknown keys under the prefix are ignored. List values are comma-separated.
pub fn apply_env_overrides<I>(config: &mut AppConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        match name {
            "APP_NAME" => config.app_name = value,
            "ENVIRONMENT" => config.environment = value,
            "SLT_MODE" => config.slt_mode = parse(&key, &value)?,

            "HTTP_SERVER_BIND_HOST" => config.http_server.bind_host = value,
            "HTTP_SERVER_PORT" => config.http_server.port = parse(&key, &value)?,
            "HTTP_SERVER_READ_TIMEOUT_SECS" => {
                config.http_server.read_timeout_secs = parse(&key, &value)?
            }
            "HTTP_SERVER_WRITE_TIMEOUT_SECS" => {
                config.http_server.write_timeout_secs = parse(&key, &value)?
            }
            "HTTP_SERVER_IDLE_TIMEOUT_SECS" => {
                config.http_server.idle_timeout_secs = parse(&key, &value)?
            }

            "CORS_ORIGINS" => config.cors.origins = split_list(&value),
            "CORS_METHODS" => config.cors.methods = split_list(&value),
            "CORS_HEADERS" => config.cors.headers = split_list(&value),

            "CACHE_ENABLED" => config.cache.enabled = parse(&key, &value)?,
            "CACHE_TTL_SECS" => config.cache.ttl_secs = parse(&key, &value)?,
            "CACHE_SHARDS" => config.cache.shards = parse(&key, &value)?,
            "CACHE_MAX_ENTRY_SIZE" => config.cache.max_entry_size = parse(&key, &value)?,
            "CACHE_HARD_MAX_CACHE_SIZE_MB" => {
                config.cache.hard_max_cache_size_mb = parse(&key, &value)?
            }
            "CACHE_STATS_ENABLED" => config.cache.stats_enabled = parse(&key, &value)?,
            "CACHE_STATS_INTERVAL_SECS" => {
                config.cache.stats_interval_secs = parse(&key, &value)?
            }

            "LOG_LEVEL" => config.log.level = value,
            "LOG_FORMAT" => config.log.format = parse_format(&key, &value)?,

            "METRICS_NAMESPACE" => config.metrics.namespace = value,

            _ => tracing::debug!(key = %key, "Ignoring unknown config override"),
        }
    }

    Ok(())
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn parse_format(key: &str, value: &str) -> Result<LogFormat, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "pretty" => Ok(LogFormat::Pretty),
        "plain" => Ok(LogFormat::Plain),
        other => Err(ConfigError::Env {
            key: key.to_string(),
            message: format!("unknown log format `{other}`"),
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
