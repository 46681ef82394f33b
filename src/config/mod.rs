//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → EDGE_* environment overrides
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable snapshot)
//!     → sections handed to the subsystems that consume them
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::AppConfig;
pub use schema::CacheConfig;
pub use schema::CorsConfig;
pub use schema::HttpServerConfig;
pub use schema::LogConfig;
pub use schema::LogFormat;
pub use schema::MetricsConfig;
