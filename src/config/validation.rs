//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, shard counts)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{AppConfig, MAX_CACHE_TTL_SECS};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &'static str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field,
        message: message.into(),
    }
}

/// Check the configuration for values that parse but cannot work.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.http_server;

    if server.bind_host.trim().is_empty() {
        errors.push(err("http_server.bind_host", "must not be empty"));
    }
    if server.read_timeout_secs == 0 {
        errors.push(err("http_server.read_timeout_secs", "must be greater than zero"));
    }
    if server.write_timeout_secs == 0 {
        errors.push(err("http_server.write_timeout_secs", "must be greater than zero"));
    }
    if server.idle_timeout_secs == 0 {
        errors.push(err("http_server.idle_timeout_secs", "must be greater than zero"));
    }

    if config.metrics.namespace.is_empty()
        || !config
            .metrics
            .namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        errors.push(err(
            "metrics.namespace",
            "must be non-empty and contain only [a-zA-Z0-9_]",
        ));
    }

    let cache = &config.cache;
    if cache.enabled {
        if cache.shards < 2 || !cache.shards.is_power_of_two() {
            errors.push(err("cache.shards", "must be a power of two greater than one"));
        }
        if cache.ttl_secs == 0 || cache.ttl_secs > MAX_CACHE_TTL_SECS {
            errors.push(err(
                "cache.ttl_secs",
                format!("must be between 1 and {MAX_CACHE_TTL_SECS}"),
            ));
        }
        if cache.max_entry_size == 0 {
            errors.push(err("cache.max_entry_size", "must be greater than zero"));
        }
        if !cache.hard_max_fits() {
            errors.push(err("cache.hard_max_cache_size_mb", "too large to express in bytes"));
        }
        if cache.stats_enabled && cache.stats_interval_secs == 0 {
            errors.push(err("cache.stats_interval_secs", "must be greater than zero"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
