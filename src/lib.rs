//! Strato: a tiered cache service with performance observability.
//!
//! The crate is organised around three cooperating parts:
//!
//! - [`cache`]: the in-process tier, the distributed (Redis-backed) tier,
//!   and the [`cache::CacheManager`] orchestrator that fronts both with
//!   single-flight request coalescing and bounded-concurrency warmup.
//! - [`monitor`]: the process-wide [`monitor::PerformanceMonitor`] with
//!   bounded metric windows, threshold alerts, JSON and Prometheus exports.
//! - [`infra`]: telemetry bootstrap and the operator HTTP surface.

pub mod cache;
pub mod config;
pub mod infra;
pub mod monitor;
pub(crate) mod sync;
