#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Router;
use strato::cache::{CacheConfig, CacheManager, RemoteBackend, RemoteCache, RemoteError};
use strato::infra::http::{OpsState, build_router};
use strato::monitor::{MonitorConfig, PerformanceMonitor};

/// TTL-aware in-memory stand-in for the Redis transport, with switchable
/// failure injection per operation.
#[derive(Default)]
pub struct FakeBackend {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FakeBackend {
    /// Seeds an upstream value as raw serialized JSON.
    pub fn seed_raw(&self, key: &str, raw: &str, ttl: Duration) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (raw.to_string(), Instant::now() + ttl));
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
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
        if self.fail_delete.load(Ordering::Relaxed) {
            return Err(RemoteError::new("delete refused"));
        }
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub manager: Arc<CacheManager>,
    pub remote: Arc<RemoteCache>,
    pub monitor: Arc<PerformanceMonitor>,
}

impl Harness {
    pub fn router(&self) -> Router {
        build_router(OpsState {
            manager: self.manager.clone(),
            remote: self.remote.clone(),
            monitor: self.monitor.clone(),
        })
    }
}

pub fn harness_with(cache_config: CacheConfig, monitor_config: MonitorConfig) -> Harness {
    let backend = Arc::new(FakeBackend::default());
    let monitor = Arc::new(PerformanceMonitor::new(monitor_config));
    let remote = Arc::new(RemoteCache::new(
        backend.clone(),
        monitor.clone(),
        &cache_config,
    ));
    let manager = Arc::new(CacheManager::new(
        remote.clone(),
        monitor.clone(),
        cache_config,
    ));
    Harness {
        backend,
        manager,
        remote,
        monitor,
    }
}

pub fn harness() -> Harness {
    harness_with(CacheConfig::default(), MonitorConfig::default())
}
