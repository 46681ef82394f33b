//! Embedded key-value cache.
//!
//! # Data Flow
//! ```text
//! handlers ──get/set/exists/delete──→ store.rs (InMemCache, atomic stats)
//!                                          │ stats()
//!                                          ↓
//!               collector.rs (every N seconds) → <ns>_cache_*_total gauges
//! ```

pub mod collector;
pub mod store;

pub use collector::CacheStatsCollector;
pub use store::{CacheError, CacheOptions, CacheStats, InMemCache};
