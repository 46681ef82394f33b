//! Sharded in-memory byte cache with TTL expiry and a byte budget.
//!
//! # Design Decisions
//! - Shards are the `DashMap` shards; the count must be a power of two
//! - Expired entries are reclaimed lazily: on access, when the byte budget
//!   is exceeded, and on each stats snapshot
//! - Over budget, the oldest entries are evicted first
//! - Keys are stored verbatim, so hash collisions never alias entries

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::MAX_CACHE_TTL_SECS;
use crate::config::CacheConfig;

/// Error type for cache construction and writes.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    #[error("entry of {size} bytes exceeds the limit of {max} bytes")]
    EntryTooLarge { size: usize, max: usize },
}

/// Cache tuning, with durations already resolved.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub ttl: Duration,
    pub shards: usize,
    pub max_entry_size: usize,
    pub hard_max_bytes: Option<usize>,
    pub stats_enabled: bool,
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            shards: config.shards,
            max_entry_size: config.max_entry_size,
            hard_max_bytes: config.hard_max_bytes(),
            stats_enabled: config.stats_enabled,
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub del_hits: u64,
    pub del_misses: u64,
    pub collisions: u64,
    pub bytes_stored: u64,
    pub items_stored: u64,
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
    size: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    del_hits: AtomicU64,
    del_misses: AtomicU64,
}

/// In-memory cache keyed by string, storing raw bytes.
#[derive(Debug)]
pub struct InMemCache {
    entries: DashMap<String, Entry>,
    options: CacheOptions,
    bytes: AtomicUsize,
    counters: Counters,
}

impl InMemCache {
    pub fn new(options: CacheOptions) -> Result<Self, CacheError> {
        if options.shards < 2 || !options.shards.is_power_of_two() {
            return Err(CacheError::InvalidConfig(format!(
                "shards must be a power of two greater than 1, got {}",
                options.shards
            )));
        }
        if options.ttl.is_zero() || options.ttl > Duration::from_secs(MAX_CACHE_TTL_SECS) {
            return Err(CacheError::InvalidConfig(format!(
                "ttl must be between 1s and {MAX_CACHE_TTL_SECS}s, got {:?}",
                options.ttl
            )));
        }

        tracing::info!(
            shards = options.shards,
            ttl = ?options.ttl,
            max_entry_size = options.max_entry_size,
            hard_max_bytes = ?options.hard_max_bytes,
            "In-memory cache created"
        );
        Ok(Self {
            entries: DashMap::with_shard_amount(options.shards),
            options,
            bytes: AtomicUsize::new(0),
            counters: Counters::default(),
        })
    }

    /// The live value for `key`, if any.
    pub fn get_value(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));

        match found {
            Some(Some(value)) => {
                self.count(&self.counters.hits);
                Some(value)
            }
            Some(None) => {
                self.remove_if_expired(key, now);
                self.count(&self.counters.misses);
                None
            }
            None => {
                self.count(&self.counters.misses);
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous value and
    /// restarting its TTL.
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Result<(), CacheError> {
        let key = key.into();
        let value = value.into();

        if value.len() > self.options.max_entry_size {
            return Err(CacheError::EntryTooLarge {
                size: value.len(),
                max: self.options.max_entry_size,
            });
        }
        let size = key.len() + value.len();
        if let Some(budget) = self.options.hard_max_bytes {
            if size > budget {
                return Err(CacheError::EntryTooLarge { size, max: budget });
            }
        }

        let entry = Entry {
            value,
            expires_at: Instant::now() + self.options.ttl,
            size,
        };
        self.bytes.fetch_add(size, Ordering::SeqCst);
        let previous = self.entries.insert(key, entry);
        if let Some(previous) = previous {
            self.bytes.fetch_sub(previous.size, Ordering::SeqCst);
        }

        if let Some(budget) = self.options.hard_max_bytes {
            if self.bytes.load(Ordering::SeqCst) > budget {
                self.shrink_to(budget);
            }
        }
        Ok(())
    }

    /// Whether a live value exists for `key`. Counts as a lookup.
    pub fn exists(&self, key: &str) -> bool {
        self.get_value(key).is_some()
    }

    /// Remove `key`. Returns whether a live entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.bytes.fetch_sub(entry.size, Ordering::SeqCst);
                let live = entry.expires_at > now;
                if live {
                    self.count(&self.counters.del_hits);
                } else {
                    self.count(&self.counters.del_misses);
                }
                live
            }
            None => {
                self.count(&self.counters.del_misses);
                false
            }
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut freed = 0;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.expires_at > now;
            if !keep {
                freed += entry.size;
                removed += 1;
            }
            keep
        });
        self.bytes.fetch_sub(freed, Ordering::SeqCst);
        removed
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes held by keys and values.
    pub fn bytes_stored(&self) -> usize {
        self.bytes.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            del_hits: self.counters.del_hits.load(Ordering::Relaxed),
            del_misses: self.counters.del_misses.load(Ordering::Relaxed),
            collisions: 0,
            bytes_stored: self.bytes_stored() as u64,
            items_stored: self.len() as u64,
        }
    }

    fn count(&self, counter: &AtomicU64) {
        if self.options.stats_enabled {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn remove_if_expired(&self, key: &str, now: Instant) {
        if let Some((_, entry)) = self.entries.remove_if(key, |_, entry| entry.expires_at <= now) {
            self.bytes.fetch_sub(entry.size, Ordering::SeqCst);
        }
    }

    /// Evict expired, then oldest, entries until at most `budget` bytes remain.
    fn shrink_to(&self, budget: usize) {
        self.purge_expired();
        if self.bytes_stored() <= budget {
            return;
        }

        let mut by_age: Vec<(Instant, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.expires_at, entry.key().clone()))
            .collect();
        by_age.sort();

        let mut evicted = 0;
        for (expires_at, key) in by_age {
            if self.bytes_stored() <= budget {
                break;
            }
            if let Some((_, entry)) = self.entries.remove_if(&key, |_, e| e.expires_at == expires_at) {
                self.bytes.fetch_sub(entry.size, Ordering::SeqCst);
                evicted += 1;
            }
        }
        tracing::debug!(evicted, budget, "Cache over budget, evicted oldest entries");
    }
}
