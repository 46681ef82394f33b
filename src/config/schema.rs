//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Service name, used in logs.
    pub app_name: String,

    /// Deployment environment (e.g. "local", "staging", "production").
    pub environment: String,

    /// Load-test mode: mounts `/rest/kill` so a test harness can stop the process.
    pub slt_mode: bool,

    /// Listener and timeout settings.
    pub http_server: HttpServerConfig,

    /// CORS response headers.
    pub cors: CorsConfig,

    /// Embedded cache settings.
    pub cache: CacheConfig,

    /// Logging settings.
    pub log: LogConfig,

    /// Metrics settings.
    pub metrics: MetricsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "edge-scaffold".to_string(),
            environment: "local".to_string(),
            slt_mode: false,
            http_server: HttpServerConfig::default(),
            cors: CorsConfig::default(),
            cache: CacheConfig::default(),
            log: LogConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpServerConfig {
    /// Interface to bind (e.g. "0.0.0.0").
    pub bind_host: String,

    /// TCP port. `0` picks an ephemeral port.
    pub port: u16,

    /// Time allowed to read request headers, in seconds.
    pub read_timeout_secs: u64,

    /// Time allowed for a handler to produce its response, in seconds.
    pub write_timeout_secs: u64,

    /// Drain window for in-flight requests during graceful shutdown, in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout_secs: 5,
            write_timeout_secs: 10,
            idle_timeout_secs: 30,
        }
    }
}

impl HttpServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Static CORS headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origins: Vec<String>,
    pub methods: Vec<String>,
    pub headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: vec!["*".to_string()],
            methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            headers: vec!["Content-Type".to_string(), "X-Request-ID".to_string()],
        }
    }
}

/// Longest accepted cache entry lifetime (ten years).
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Embedded cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Create the cache and its stats collector at startup.
    pub enabled: bool,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,

    /// Number of shards. Must be a power of two greater than one.
    pub shards: usize,

    /// Largest accepted value, in bytes.
    pub max_entry_size: usize,

    /// Total byte budget, in megabytes. `0` means unbounded.
    pub hard_max_cache_size_mb: usize,

    /// Track hit/miss statistics.
    pub stats_enabled: bool,

    /// Interval between stats snapshots, in seconds.
    pub stats_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 600,
            shards: 64,
            max_entry_size: 500,
            hard_max_cache_size_mb: 256,
            stats_enabled: true,
            stats_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Byte budget, or `None` when unbounded. Saturates at `usize::MAX`.
    pub fn hard_max_bytes(&self) -> Option<usize> {
        (self.hard_max_cache_size_mb > 0)
            .then(|| self.hard_max_cache_size_mb.saturating_mul(BYTES_PER_MB))
    }

    /// Whether `hard_max_cache_size_mb` converts to bytes without overflow.
    pub(crate) fn hard_max_fits(&self) -> bool {
        self.hard_max_cache_size_mb.checked_mul(BYTES_PER_MB).is_some()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Plain,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prefix for every metric name.
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "edge_service".to_string(),
        }
    }
}
