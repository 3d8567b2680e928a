//! Distributed cache tier client.
//!
//! [`RemoteCache`] wraps a [`RemoteBackend`] (Redis in production, an
//! in-memory fake in tests) and owns everything the rest of the system
//! needs to know about the shared tier: hit/miss/error counters, per-call
//! latency samples, and the probe-key health check.
//!
//! Transport failures never escape as panics or untyped errors; they
//! surface as [`RemoteError`] so the manager can apply its fallback policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use redis::AsyncCommands;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::timeout;
use tracing::warn;

use super::config::CacheConfig;
use crate::monitor::PerformanceMonitor;

const SOURCE: &str = "strato::cache::remote";

/// Reserved key used by the health probe. Never handed out to callers.
const PROBE_KEY: &str = "strato:health:probe";

/// Transport-level failure against the distributed tier. Distinguishable
/// from "key absent" by construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("distributed cache unavailable: {reason}")]
pub struct RemoteError {
    pub reason: String,
}

impl RemoteError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn timed_out(op: &str) -> Self {
        Self::new(format!("{op} timed out"))
    }
}

/// Raw key/value transport. Payloads are serialized JSON strings; TTL and
/// health semantics live in [`RemoteCache`] above this seam.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RemoteError>;
    async fn delete(&self, key: &str) -> Result<(), RemoteError>;
}

/// Redis-backed transport. Connects lazily per operation so a cache outage
/// never prevents process start; every call is bounded by `op_timeout`.
pub struct RedisBackend {
    client: redis::Client,
    op_timeout: Duration,
}

impl RedisBackend {
    pub fn open(url: &str, op_timeout: Duration) -> Result<Self, RemoteError> {
        let client = redis::Client::open(url).map_err(|err| RemoteError::new(err.to_string()))?;
        Ok(Self { client, op_timeout })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, RemoteError> {
        timeout(
            self.op_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| RemoteError::timed_out("connect"))?
        .map_err(|err| RemoteError::new(err.to_string()))
    }
}

#[async_trait]
impl RemoteBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteError> {
        let mut conn = self.conn().await?;
        timeout(self.op_timeout, conn.get::<_, Option<String>>(key))
            .await
            .map_err(|_| RemoteError::timed_out("get"))?
            .map_err(|err| RemoteError::new(err.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RemoteError> {
        let mut conn = self.conn().await?;
        let seconds = ttl.as_secs().max(1);
        timeout(self.op_timeout, conn.set_ex::<_, _, ()>(key, value, seconds))
            .await
            .map_err(|_| RemoteError::timed_out("set"))?
            .map_err(|err| RemoteError::new(err.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        let mut conn = self.conn().await?;
        timeout(self.op_timeout, conn.del::<_, u64>(key))
            .await
            .map_err(|_| RemoteError::timed_out("delete"))?
            .map_err(|err| RemoteError::new(err.to_string()))?;
        Ok(())
    }
}

/// Result of the probe-key round trip.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub service: String,
    pub connected: bool,
    pub latency_ms: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_checked_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Monotone per-call counters for the life of the process.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RemoteCounters {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

pub struct RemoteCache {
    backend: Arc<dyn RemoteBackend>,
    monitor: Arc<PerformanceMonitor>,
    probe_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl RemoteCache {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        monitor: Arc<PerformanceMonitor>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            backend,
            monitor,
            probe_ttl: config.probe_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Returns the stored value if present and unexpired. A transport
    /// failure is an `Err`, never `Ok(None)`.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, RemoteError> {
        let started = Instant::now();
        let result = self.backend.get(key).await;
        self.observe("get", started);

        match result {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    counter!("strato_cache_remote_hit_total").increment(1);
                    Ok(Some(value))
                }
                Err(err) => {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    counter!("strato_cache_remote_error_total").increment(1);
                    Err(RemoteError::new(format!(
                        "stored payload for `{key}` is not valid JSON: {err}"
                    )))
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!("strato_cache_remote_miss_total").increment(1);
                Ok(None)
            }
            Err(err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                counter!("strato_cache_remote_error_total").increment(1);
                Err(err)
            }
        }
    }

    /// Writes a value with an expiry, replacing both value and expiry of any
    /// previous entry.
    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), RemoteError> {
        let raw = serde_json::to_string(value)
            .map_err(|err| RemoteError::new(format!("payload serialization failed: {err}")))?;
        let started = Instant::now();
        let result = self.backend.set(key, raw, ttl).await;
        self.observe("set", started);

        if result.is_err() {
            self.errors.fetch_add(1, Ordering::Relaxed);
            counter!("strato_cache_remote_error_total").increment(1);
        }
        result
    }

    /// Removes the key. No error if absent.
    pub async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        let started = Instant::now();
        let result = self.backend.delete(key).await;
        self.observe("delete", started);

        if result.is_err() {
            self.errors.fetch_add(1, Ordering::Relaxed);
            counter!("strato_cache_remote_error_total").increment(1);
        }
        result
    }

    /// Round-trips the reserved probe key: set → get-must-match → delete.
    /// Any deviation reports `connected: false` with the latency observed up
    /// to the failure point. Probe calls count like any other client call,
    /// so a failed probe lands in the error counter.
    pub async fn health_check(&self) -> HealthStatus {
        let started = Instant::now();
        let stamp = Value::from(OffsetDateTime::now_utc().unix_timestamp_nanos().to_string());

        let outcome = self.probe_round_trip(&stamp).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.monitor.record_metric(
            "remote_cache_latency_ms",
            latency_ms,
            Some(HashMap::from([(
                "operation".to_string(),
                "health".to_string(),
            )])),
        );
        histogram!("strato_remote_op_ms", "operation" => "health").record(latency_ms);

        match outcome {
            Ok(()) => HealthStatus {
                service: "redis".to_string(),
                connected: true,
                latency_ms,
                last_checked_at: OffsetDateTime::now_utc(),
                error: None,
            },
            Err(reason) => {
                warn!(
                    target: "strato::cache::remote",
                    source = SOURCE,
                    error = %reason,
                    "distributed tier health probe failed"
                );
                HealthStatus {
                    service: "redis".to_string(),
                    connected: false,
                    latency_ms,
                    last_checked_at: OffsetDateTime::now_utc(),
                    error: Some(reason),
                }
            }
        }
    }

    async fn probe_round_trip(&self, stamp: &Value) -> Result<(), String> {
        self.set(PROBE_KEY, stamp, self.probe_ttl)
            .await
            .map_err(|err| err.to_string())?;

        let read = self.get(PROBE_KEY).await.map_err(|err| err.to_string())?;
        if read.as_ref() != Some(stamp) {
            return Err("probe readback did not match the written value".to_string());
        }

        self.delete(PROBE_KEY).await.map_err(|err| err.to_string())
    }

    pub fn counters(&self) -> RemoteCounters {
        RemoteCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn observe(&self, op: &'static str, started: Instant) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.monitor.record_metric(
            "remote_cache_latency_ms",
            elapsed_ms,
            Some(HashMap::from([(
                "operation".to_string(),
                op.to_string(),
            )])),
        );
        histogram!("strato_remote_op_ms", "operation" => op).record(elapsed_ms);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;

    use super::{RemoteBackend, RemoteError};

    /// TTL-aware in-memory stand-in for the Redis transport.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        entries: Mutex<HashMap<String, (String, Instant)>>,
        pub(crate) fail_get: AtomicBool,
        pub(crate) fail_set: AtomicBool,
    }

    impl FakeBackend {
        pub(crate) fn is_clean(&self) -> bool {
            self.entries.lock().unwrap().is_empty()
        }
    }

    #[async_trait]
    impl RemoteBackend for FakeBackend {
        async fn get(&self, key: &str) -> Result<Option<String>, RemoteError> {
            if self.fail_get.load(Ordering::Relaxed) {
                return Err(RemoteError::new("get refused"));
            }
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(key)
                .filter(|(_, expires)| *expires > Instant::now())
                .map(|(raw, _)| raw.clone()))
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RemoteError> {
            if self.fail_set.load(Ordering::Relaxed) {
                return Err(RemoteError::new("set refused"));
            }
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value, Instant::now() + ttl));
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), RemoteError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }
}
