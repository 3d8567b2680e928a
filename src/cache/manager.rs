//! Cache orchestration.
//!
//! [`CacheManager`] fronts the memory tier and the distributed client with
//! three operations: a single-flight `get_or_compute`, a bounded-concurrency
//! warmup over registered hot keys, and an aggregated performance report.
//!
//! Fallback policy: reads go memory → distributed → compute. A distributed
//! tier outage downgrades the read path to compute-on-miss with a warning;
//! it never fails the caller on its own.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use metrics::histogram;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::config::CacheConfig;
use super::flight::{ComputeError, FlightGroup, FlightRole};
use super::memory::MemoryStore;
use super::remote::RemoteCache;
use crate::monitor::PerformanceMonitor;
use crate::sync::mutex_lock;

const SOURCE: &str = "strato::cache::manager";

// Fixed heuristics behind the report recommendations.
const LOW_HIT_RATE: f64 = 0.7;
const SLOW_RESPONSE_MS: f64 = 100.0;

/// Boxed compute call, as stored in the hot-key registry.
pub type ComputeFuture = BoxFuture<'static, Result<Value, ComputeError>>;

/// Factory producing a fresh compute call for a hot key on every warmup pass.
pub type ComputeSource = Arc<dyn Fn() -> ComputeFuture + Send + Sync>;

#[derive(Clone)]
struct HotKey {
    key: String,
    ttl: Duration,
    source: ComputeSource,
}

/// Outcome of one warmup pass. Keys land in exactly one bucket.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupReport {
    pub warmed: Vec<String>,
    pub failed: Vec<String>,
    /// Keys never dispatched because the wall-clock budget elapsed first.
    pub skipped: Vec<String>,
    pub duration_ms: u64,
}

impl WarmupReport {
    pub fn total(&self) -> usize {
        self.warmed.len() + self.failed.len() + self.skipped.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "warmed {}/{} keys ({} failed, {} skipped)",
            self.warmed.len(),
            self.total(),
            self.failed.len(),
            self.skipped.len()
        )
    }
}

/// Per-tier read counters with a derived hit rate.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierBreakdown {
    pub memory: TierStats,
    pub distributed: TierStats,
}

/// Aggregated view over both tiers and the monitor's latency series.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub hit_rate: f64,
    pub average_response_time_ms: f64,
    pub memory_entries: usize,
    pub tiers: TierBreakdown,
    pub recommendations: Vec<String>,
}

pub struct CacheManager {
    memory: MemoryStore,
    remote: Arc<RemoteCache>,
    flights: FlightGroup,
    monitor: Arc<PerformanceMonitor>,
    config: CacheConfig,
    hot_keys: Mutex<Vec<HotKey>>,
    /// Distributed-tier hits on the request path. The client's own counters
    /// also include probe traffic, so the overall hit rate uses this one.
    remote_hits: AtomicU64,
}

impl CacheManager {
    pub fn new(
        remote: Arc<RemoteCache>,
        monitor: Arc<PerformanceMonitor>,
        config: CacheConfig,
    ) -> Self {
        Self {
            memory: MemoryStore::new(&config),
            remote,
            flights: FlightGroup::new(),
            monitor,
            config,
            hot_keys: Mutex::new(Vec::new()),
            remote_hits: AtomicU64::new(0),
        }
    }

    /// Default TTL for callers that have no opinion.
    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Reads through both tiers, computing on a full miss. Concurrent calls
    /// for the same uncached key run `compute` exactly once and all receive
    /// its result, success or failure. A compute failure is never cached.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Value, ComputeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ComputeError>>,
    {
        let started = Instant::now();
        let result = self.read_or_compute(key, ttl, compute).await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.monitor
            .record_metric("cache_response_time_ms", elapsed_ms, None);
        histogram!("strato_cache_response_ms").record(elapsed_ms);
        result
    }

    async fn read_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Value, ComputeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ComputeError>>,
    {
        if let Some(value) = self.memory.get(key) {
            return Ok(value);
        }

        match self.remote.get(key).await {
            Ok(Some(value)) => {
                self.remote_hits.fetch_add(1, Ordering::Relaxed);
                self.memory.set(key, value.clone(), ttl);
                return Ok(value);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    target: "strato::cache::manager",
                    source = SOURCE,
                    key,
                    error = %err,
                    "distributed tier unavailable, falling back to compute"
                );
            }
        }

        match self.flights.join(key) {
            FlightRole::Follower(mut rx) => rx.recv().await.unwrap_or_else(|_| {
                Err(ComputeError::new("in-flight computation was abandoned"))
            }),
            FlightRole::Leader => {
                let result = compute().await;
                if let Ok(value) = &result {
                    self.store(key, value, ttl).await;
                }
                self.flights.complete(key, result.clone());
                result
            }
        }
    }

    /// Writes to both tiers. A distributed-tier write failure keeps the
    /// local entry; the value is just not shared across processes until the
    /// next successful write.
    async fn store(&self, key: &str, value: &Value, ttl: Duration) {
        self.memory.set(key, value.clone(), ttl);
        if let Err(err) = self.remote.set(key, value, ttl).await {
            warn!(
                target: "strato::cache::manager",
                source = SOURCE,
                key,
                error = %err,
                "distributed tier write failed, entry remains local only"
            );
        }
    }

    /// Adds a key to the warmup set, replacing any source already registered
    /// under the same key. `source` is invoked once per warmup pass.
    pub fn register_hot_key(&self, key: impl Into<String>, ttl: Duration, source: ComputeSource) {
        let key = key.into();
        let mut hot_keys = mutex_lock(&self.hot_keys, SOURCE, "register_hot_key");
        if let Some(existing) = hot_keys.iter_mut().find(|entry| entry.key == key) {
            existing.ttl = ttl;
            existing.source = source;
        } else {
            hot_keys.push(HotKey { key, ttl, source });
        }
    }

    pub fn hot_key_count(&self) -> usize {
        mutex_lock(&self.hot_keys, SOURCE, "hot_key_count").len()
    }

    /// Eagerly populates the registered hot keys through a worker pool of
    /// the configured size. The wall-clock budget gates dispatch of new
    /// items only; computes already in flight when it elapses run to
    /// completion and are logged as slow. Undispatched keys are skipped.
    pub async fn warm_up(&self) -> WarmupReport {
        let started = Instant::now();
        let budget = self.config.warmup_budget;
        let pool = self.config.warmup_concurrency_non_zero();

        let mut queue: VecDeque<HotKey> =
            mutex_lock(&self.hot_keys, SOURCE, "warm_up").clone().into();
        let total = queue.len();

        let mut warmed = Vec::new();
        let mut failed = Vec::new();
        let mut inflight = FuturesUnordered::new();

        loop {
            while inflight.len() < pool && started.elapsed() < budget {
                let Some(HotKey { key, ttl, source }) = queue.pop_front() else {
                    break;
                };
                inflight.push(async move {
                    let result = source().await;
                    (key, ttl, result)
                });
            }

            let Some((key, ttl, result)) = inflight.next().await else {
                break;
            };
            let over_budget = started.elapsed() >= budget;

            match result {
                Ok(value) => {
                    self.store(&key, &value, ttl).await;
                    if over_budget {
                        warn!(
                            target: "strato::cache::manager",
                            source = SOURCE,
                            key,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "slow warmup item finished after the scheduling budget"
                        );
                    }
                    warmed.push(key);
                }
                Err(err) => {
                    warn!(
                        target: "strato::cache::manager",
                        source = SOURCE,
                        key,
                        error = %err,
                        "warmup compute failed"
                    );
                    failed.push(key);
                }
            }
        }

        let skipped: Vec<String> = queue.into_iter().map(|entry| entry.key).collect();
        let duration_ms = started.elapsed().as_millis() as u64;
        self.monitor
            .record_metric("warmup_duration_ms", duration_ms as f64, None);

        let report = WarmupReport {
            warmed,
            failed,
            skipped,
            duration_ms,
        };
        info!(
            target: "strato::cache::manager",
            source = SOURCE,
            total,
            warmed = report.warmed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            duration_ms,
            "cache warmup finished"
        );
        report
    }

    /// Snapshot of hit rates, latency, and heuristic recommendations. Also
    /// feeds the overall hit rate back into the monitor as `cache_hit_rate`
    /// so it participates in thresholds and exports.
    pub fn performance_report(&self) -> PerformanceReport {
        let (memory_hits, memory_misses) = self.memory.counters();
        let remote = self.remote.counters();

        // Every logical read touches the memory tier first, so memory reads
        // count the requests; a request is served from cache if either tier
        // answered it. Request-path remote hits are tracked here because the
        // client's counters also see health-probe traffic.
        let requests = memory_hits + memory_misses;
        let served = memory_hits + self.remote_hits.load(Ordering::Relaxed);
        let hit_rate = ratio(served, requests);

        let average_response_time_ms = self
            .monitor
            .summary_for("cache_response_time_ms")
            .map(|summary| summary.average)
            .unwrap_or(0.0);

        let mut recommendations = Vec::new();
        if requests > 0 && hit_rate < LOW_HIT_RATE {
            recommendations
                .push("cache hit rate below 70%: consider widening the warmup key set".to_string());
        }
        if average_response_time_ms > SLOW_RESPONSE_MS {
            recommendations.push(
                "average response time above 100ms: inspect distributed tier latency".to_string(),
            );
        }
        if remote.errors > 0 {
            recommendations.push(
                "distributed tier reported transport errors: verify connectivity".to_string(),
            );
        }

        self.monitor.record_metric("cache_hit_rate", hit_rate, None);

        PerformanceReport {
            hit_rate,
            average_response_time_ms,
            memory_entries: self.memory.len(),
            tiers: TierBreakdown {
                memory: TierStats {
                    hits: memory_hits,
                    misses: memory_misses,
                    errors: 0,
                    hit_rate: ratio(memory_hits, memory_hits + memory_misses),
                },
                distributed: TierStats {
                    hits: remote.hits,
                    misses: remote.misses,
                    errors: remote.errors,
                    hit_rate: ratio(remote.hits, remote.hits + remote.misses + remote.errors),
                },
            },
            recommendations,
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
