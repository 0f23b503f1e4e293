//! Response cache for read methods
//!
//! In-memory only. Entries expire once their TTL has fully elapsed.
//!
//! Keys carry caller-chosen params, so the store is bounded: once it holds
//! [`SWEEP_THRESHOLD`] entries, a write sweeps out every expired entry (at
//! most once per [`SWEEP_INTERVAL`]), and nothing new is stored past
//! [`MAX_ENTRIES`].

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Entry count at which writes start sweeping expired entries
pub const SWEEP_THRESHOLD: usize = 256;

/// Minimum time between two sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Hard cap on stored entries
pub const MAX_ENTRIES: usize = 10_000;

/// Key prefixes of reads that depend on the active network or account
pub const NETWORK_PREFIXES: [&str; 3] = ["wallet:", "evm:", "solana:"];

/// One cached result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Full cache key
    pub key: String,
    /// Cached result
    pub value: Value,
    /// When it was stored
    pub stored_at: Instant,
    /// How long it stays valid
    pub ttl: Duration,
}

impl CacheEntry {
    /// Check if the entry is still valid at `now`
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that missed or found an expired entry
    pub misses: u64,
    /// Entries dropped on expiry
    pub expired: u64,
}

/// TTL cache keyed by method cache key
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    stats: Arc<RwLock<CacheStats>>,
    last_sweep: Mutex<Option<Instant>>,
}

impl ResponseCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose the full key for a call
    pub fn key_for(prefix: &str, origin: &str, params: &[Value]) -> String {
        let params = serde_json::to_string(params).unwrap_or_default();
        format!("{}|{}|{}", prefix, origin, params)
    }

    /// Fresh value for a key
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let fresh = self
            .entries
            .get(key)
            .map(|entry| entry.is_fresh(now).then(|| entry.value.clone()));

        match fresh {
            Some(Some(value)) => {
                self.stats.write().hits += 1;
                Some(value)
            }
            Some(None) => {
                self.entries.remove_if(key, |_, entry| !entry.is_fresh(now));
                let mut stats = self.stats.write();
                stats.misses += 1;
                stats.expired += 1;
                None
            }
            None => {
                self.stats.write().misses += 1;
                None
            }
        }
    }

    /// Store a value
    pub fn put(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        self.maybe_sweep(now);

        if self.entries.len() >= MAX_ENTRIES && !self.entries.contains_key(&key) {
            debug!(key = %key, max = MAX_ENTRIES, "Response cache full; result not stored");
            return;
        }
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                stored_at: now,
                ttl,
            },
        );
    }

    fn maybe_sweep(&self, now: Instant) {
        if self.entries.len() < SWEEP_THRESHOLD {
            return;
        }
        {
            let mut last = self.last_sweep.lock();
            if last.is_some_and(|at| now.saturating_duration_since(at) < SWEEP_INTERVAL) {
                return;
            }
            *last = Some(now);
        }
        self.sweep(now);
    }

    /// Drop every expired entry, returning how many went
    pub fn prune_expired(&self) -> usize {
        self.sweep(Instant::now())
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            self.stats.write().expired += dropped as u64;
            debug!(dropped, remaining = self.entries.len(), "Expired cache entries swept");
        }
        dropped
    }

    /// Drop reads that depend on the active network or account
    pub fn invalidate_network_reads(&self) -> usize {
        NETWORK_PREFIXES
            .iter()
            .map(|prefix| self.invalidate(prefix))
            .sum()
    }

    /// Drop every entry whose key starts with `prefix`
    pub fn invalidate(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before - self.entries.len()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries (fresh or not)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statistics so far
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}
