//! Strato cache system.
//!
//! Two tiers queried cheapest-first:
//!
//! - **Memory tier**: in-process, LRU-bounded, TTL-aware.
//! - **Distributed tier**: a shared Redis-backed store reached through
//!   [`RemoteCache`], which owns per-call counters and the health probe.
//!
//! [`CacheManager`] fronts both tiers with a single-flight `get_or_compute`
//! contract and a bounded-concurrency warmup pass. Distributed-tier outages
//! degrade reads to direct computation; they never fail the caller.

mod config;
mod entry;
mod flight;
mod manager;
mod memory;
mod remote;

pub use config::CacheConfig;
pub use entry::{CacheEntry, CacheTier};
pub use flight::{ComputeError, FlightGroup, FlightResult, FlightRole};
pub use manager::{
    CacheManager, ComputeFuture, ComputeSource, PerformanceReport, TierBreakdown, TierStats,
    WarmupReport,
};
pub use memory::MemoryStore;
pub use remote::{HealthStatus, RedisBackend, RemoteBackend, RemoteCache, RemoteCounters, RemoteError};
