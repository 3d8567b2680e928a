//! Cache configuration.
//!
//! Resolved from `strato.toml` / environment / CLI by the `config` module;
//! this struct carries only what the cache subsystem needs.

use std::num::NonZeroUsize;
use std::time::Duration;

// Default values for cache configuration
const DEFAULT_MEMORY_ENTRY_LIMIT: usize = 1024;
const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_OP_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_PROBE_TTL_SECS: u64 = 10;
const DEFAULT_WARMUP_CONCURRENCY: usize = 4;
const DEFAULT_WARMUP_BUDGET_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries held by the in-process tier before LRU eviction.
    pub memory_entry_limit: usize,
    /// TTL applied when a caller does not specify one.
    pub default_ttl: Duration,
    /// Per-operation timeout against the distributed tier. A timeout is
    /// treated identically to a transport error.
    pub op_timeout: Duration,
    /// TTL on the reserved health-probe key.
    pub probe_ttl: Duration,
    /// Maximum simultaneous compute calls during warmup.
    pub warmup_concurrency: usize,
    /// Wall-clock budget gating dispatch of new warmup items. Items already
    /// in flight when the budget elapses run to completion.
    pub warmup_budget: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_entry_limit: DEFAULT_MEMORY_ENTRY_LIMIT,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
            probe_ttl: Duration::from_secs(DEFAULT_PROBE_TTL_SECS),
            warmup_concurrency: DEFAULT_WARMUP_CONCURRENCY,
            warmup_budget: Duration::from_secs(DEFAULT_WARMUP_BUDGET_SECS),
        }
    }
}

impl From<&crate::config::Settings> for CacheConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            memory_entry_limit: settings.cache.memory_entry_limit,
            default_ttl: settings.cache.default_ttl,
            op_timeout: settings.redis.op_timeout,
            probe_ttl: settings.cache.probe_ttl,
            warmup_concurrency: settings.warmup.concurrency.get(),
            warmup_budget: settings.warmup.budget,
        }
    }
}

impl CacheConfig {
    /// Returns the memory entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_entry_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the warmup pool size, clamping to 1 if zero.
    pub fn warmup_concurrency_non_zero(&self) -> usize {
        self.warmup_concurrency.max(1)
    }
}
