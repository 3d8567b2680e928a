//! Process-wide performance monitor.
//!
//! Metric samples go into count-bounded per-name windows (oldest evicted
//! first). Thresholds are evaluated synchronously on every write; there is
//! no background timer, so behavior is deterministic under test. Alerts are
//! raised or refreshed on breach and resolved only by an explicit caller
//! action.
//!
//! The monitor has no dependency on the cache modules; the cache reports
//! into it, not the other way around.

mod alert;
mod export;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::sync::{mutex_lock, rw_read, rw_write};

pub use alert::{Alert, AlertSeverity};
pub use export::{ExportError, PROMETHEUS_CONTENT_TYPE};

const SOURCE: &str = "strato::monitor";

const DEFAULT_RETENTION_LIMIT: usize = 500;

/// Resolved alerts kept for history. Unresolved alerts are never pruned.
const RESOLVED_ALERT_RETENTION: usize = 100;

/// Warning/critical bounds for one metric name. A window aggregate at or
/// above a bound is a breach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub warning: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid threshold: {reason}")]
pub struct ThresholdError {
    pub reason: String,
}

impl Threshold {
    pub fn new(warning: f64, critical: f64) -> Result<Self, ThresholdError> {
        if !warning.is_finite() || !critical.is_finite() {
            return Err(ThresholdError {
                reason: "bounds must be finite".to_string(),
            });
        }
        if warning > critical {
            return Err(ThresholdError {
                reason: format!("warning bound {warning} exceeds critical bound {critical}"),
            });
        }
        Ok(Self { warning, critical })
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Samples retained per metric name; the oldest is evicted first.
    pub retention_limit: usize,
    pub thresholds: HashMap<String, Threshold>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            retention_limit: DEFAULT_RETENTION_LIMIT,
            thresholds: HashMap::new(),
        }
    }
}

impl MonitorConfig {
    pub fn with_threshold(mut self, metric: impl Into<String>, threshold: Threshold) -> Self {
        self.thresholds.insert(metric.into(), threshold);
        self
    }
}

/// One recorded observation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
}

/// Aggregates over one metric's retained window.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub latest: f64,
}

pub struct PerformanceMonitor {
    config: MonitorConfig,
    series: RwLock<HashMap<String, VecDeque<MetricSample>>>,
    alerts: Mutex<Vec<Alert>>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            series: RwLock::new(HashMap::new()),
            alerts: Mutex::new(Vec::new()),
        }
    }

    /// Appends a sample and evaluates the metric's thresholds against the
    /// new window average, raising or refreshing an alert on breach. A value
    /// dropping back below threshold never auto-resolves anything.
    pub fn record_metric(&self, name: &str, value: f64, tags: Option<HashMap<String, String>>) {
        let limit = self.config.retention_limit.max(1);
        let aggregate = {
            let mut series = rw_write(&self.series, SOURCE, "record_metric");
            let window = series.entry(name.to_string()).or_default();
            window.push_back(MetricSample {
                value,
                timestamp: OffsetDateTime::now_utc(),
                tags,
            });
            while window.len() > limit {
                window.pop_front();
            }
            window.iter().map(|sample| sample.value).sum::<f64>() / window.len() as f64
        };
        self.evaluate_threshold(name, aggregate);
    }

    fn evaluate_threshold(&self, name: &str, aggregate: f64) {
        let Some(threshold) = self.config.thresholds.get(name) else {
            return;
        };
        let breach = if aggregate >= threshold.critical {
            Some((AlertSeverity::Critical, threshold.critical))
        } else if aggregate >= threshold.warning {
            Some((AlertSeverity::Warning, threshold.warning))
        } else {
            None
        };
        let Some((severity, bound)) = breach else {
            return;
        };

        let mut alerts = mutex_lock(&self.alerts, SOURCE, "evaluate_threshold");
        match alerts
            .iter_mut()
            .find(|alert| !alert.resolved && alert.metric == name)
        {
            Some(alert) => alert.refresh(severity, aggregate, bound),
            None => {
                alerts.push(Alert::raise(name, severity, aggregate, bound));
                counter!("strato_alert_raised_total").increment(1);
            }
        }
    }

    /// Marks the alert resolved. Returns whether a previously-unresolved
    /// alert was found; unknown and already-resolved ids both return false.
    /// Resolved history is capped; the oldest resolved alerts drop first.
    pub fn resolve_alert(&self, id: Uuid) -> bool {
        let mut alerts = mutex_lock(&self.alerts, SOURCE, "resolve_alert");
        let resolved = match alerts
            .iter_mut()
            .find(|alert| alert.id == id && !alert.resolved)
        {
            Some(alert) => {
                alert.resolve();
                counter!("strato_alert_resolved_total").increment(1);
                true
            }
            None => false,
        };
        if resolved {
            prune_resolved(&mut alerts);
        }
        resolved
    }

    /// Per-name aggregates over the retained windows, in stable name order.
    pub fn get_metrics(&self) -> BTreeMap<String, MetricSummary> {
        rw_read(&self.series, SOURCE, "get_metrics")
            .iter()
            .filter_map(|(name, window)| summarize(window).map(|s| (name.clone(), s)))
            .collect()
    }

    pub fn summary_for(&self, name: &str) -> Option<MetricSummary> {
        rw_read(&self.series, SOURCE, "summary_for")
            .get(name)
            .and_then(|window| summarize(window))
    }

    pub fn get_alerts(&self) -> Vec<Alert> {
        mutex_lock(&self.alerts, SOURCE, "get_alerts").clone()
    }

    pub fn unresolved_alerts(&self) -> Vec<Alert> {
        mutex_lock(&self.alerts, SOURCE, "unresolved_alerts")
            .iter()
            .filter(|alert| !alert.resolved)
            .cloned()
            .collect()
    }
}

fn prune_resolved(alerts: &mut Vec<Alert>) {
    let mut excess = alerts
        .iter()
        .filter(|alert| alert.resolved)
        .count()
        .saturating_sub(RESOLVED_ALERT_RETENTION);
    if excess == 0 {
        return;
    }
    alerts.retain(|alert| {
        if alert.resolved && excess > 0 {
            excess -= 1;
            false
        } else {
            true
        }
    });
}

fn summarize(window: &VecDeque<MetricSample>) -> Option<MetricSummary> {
    let latest = window.back()?.value;
    let count = window.len();
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for sample in window {
        sum += sample.value;
        min = min.min(sample.value);
        max = max.max(sample.value);
    }
    Some(MetricSummary {
        count,
        average: sum / count as f64,
        min,
        max,
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitored(metric: &str, warning: f64, critical: f64) -> PerformanceMonitor {
        PerformanceMonitor::new(
            MonitorConfig::default()
                .with_threshold(metric, Threshold::new(warning, critical).unwrap()),
        )
    }

    #[test]
    fn threshold_bounds_are_validated() {
        assert!(Threshold::new(100.0, 250.0).is_ok());
        assert!(Threshold::new(250.0, 100.0).is_err());
        assert!(Threshold::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn summaries_aggregate_the_window() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        monitor.record_metric("latency_ms", 10.0, None);
        monitor.record_metric("latency_ms", 30.0, None);
        monitor.record_metric("latency_ms", 20.0, None);

        let summary = monitor.summary_for("latency_ms").unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average, 20.0);
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 30.0);
        assert_eq!(summary.latest, 20.0);

        assert!(monitor.summary_for("unknown").is_none());
    }

    #[test]
    fn retention_evicts_the_oldest_samples() {
        let monitor = PerformanceMonitor::new(MonitorConfig {
            retention_limit: 3,
            ..Default::default()
        });
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            monitor.record_metric("m", value, None);
        }

        let summary = monitor.summary_for("m").unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, 3.0);
        assert_eq!(summary.latest, 5.0);
    }

    #[test]
    fn breach_raises_one_alert_and_refreshes_in_place() {
        let monitor = monitored("latency_ms", 100.0, 250.0);

        monitor.record_metric("latency_ms", 150.0, None);
        monitor.record_metric("latency_ms", 170.0, None);

        let alerts = monitor.get_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert_eq!(alerts[0].current_value, 160.0); // window average
    }

    #[test]
    fn repeat_breach_can_escalate_severity() {
        let monitor = monitored("latency_ms", 100.0, 250.0);

        monitor.record_metric("latency_ms", 150.0, None);
        let id = monitor.get_alerts()[0].id;

        monitor.record_metric("latency_ms", 900.0, None); // average 525
        let alerts = monitor.get_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, id);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn values_below_threshold_raise_nothing_and_resolve_nothing() {
        // retention 1 makes the aggregate the latest sample
        let monitor = PerformanceMonitor::new(
            MonitorConfig {
                retention_limit: 1,
                ..Default::default()
            }
            .with_threshold("latency_ms", Threshold::new(100.0, 250.0).unwrap()),
        );

        monitor.record_metric("latency_ms", 50.0, None);
        assert!(monitor.get_alerts().is_empty());

        monitor.record_metric("latency_ms", 400.0, None);
        assert_eq!(monitor.unresolved_alerts().len(), 1);

        // dropping back below threshold does not auto-resolve
        monitor.record_metric("latency_ms", 1.0, None);
        assert_eq!(monitor.unresolved_alerts().len(), 1);
    }

    #[test]
    fn resolve_is_idempotent() {
        let monitor = monitored("latency_ms", 100.0, 250.0);
        monitor.record_metric("latency_ms", 150.0, None);
        let id = monitor.get_alerts()[0].id;

        assert!(monitor.resolve_alert(id));
        assert!(!monitor.resolve_alert(id));
        assert!(!monitor.resolve_alert(Uuid::new_v4()));

        let alert = &monitor.get_alerts()[0];
        assert!(alert.resolved);
        assert!(alert.resolved_at.is_some());
    }

    #[test]
    fn breach_after_resolution_opens_a_fresh_alert() {
        let monitor = monitored("latency_ms", 100.0, 250.0);

        monitor.record_metric("latency_ms", 150.0, None);
        let first = monitor.get_alerts()[0].id;
        assert!(monitor.resolve_alert(first));

        // push the window average back over the warning bound
        monitor.record_metric("latency_ms", 900.0, None);
        let unresolved = monitor.unresolved_alerts();
        assert_eq!(unresolved.len(), 1);
        assert_ne!(unresolved[0].id, first);
        assert_eq!(monitor.get_alerts().len(), 2);
    }

    #[test]
    fn resolved_alert_history_is_capped() {
        // retention 1 makes every breach aggregate the latest sample
        let monitor = PerformanceMonitor::new(
            MonitorConfig {
                retention_limit: 1,
                ..Default::default()
            }
            .with_threshold("latency_ms", Threshold::new(100.0, 250.0).unwrap()),
        );

        for _ in 0..(RESOLVED_ALERT_RETENTION + 20) {
            monitor.record_metric("latency_ms", 400.0, None);
            let id = monitor.unresolved_alerts()[0].id;
            assert!(monitor.resolve_alert(id));
        }

        let alerts = monitor.get_alerts();
        assert_eq!(alerts.len(), RESOLVED_ALERT_RETENTION);
        assert!(alerts.iter().all(|alert| alert.resolved));
    }

    #[test]
    fn pruning_never_touches_unresolved_alerts() {
        let monitor = PerformanceMonitor::new(
            MonitorConfig {
                retention_limit: 1,
                ..Default::default()
            }
            .with_threshold("latency_ms", Threshold::new(100.0, 250.0).unwrap())
            .with_threshold("queue_depth", Threshold::new(10.0, 50.0).unwrap()),
        );

        // a standing breach on one metric stays unresolved throughout
        monitor.record_metric("queue_depth", 99.0, None);
        let standing = monitor.unresolved_alerts()[0].id;

        for _ in 0..(RESOLVED_ALERT_RETENTION + 20) {
            monitor.record_metric("latency_ms", 400.0, None);
            let id = monitor
                .unresolved_alerts()
                .into_iter()
                .find(|alert| alert.metric == "latency_ms")
                .map(|alert| alert.id)
                .unwrap();
            assert!(monitor.resolve_alert(id));
        }

        let alerts = monitor.get_alerts();
        assert_eq!(alerts.len(), RESOLVED_ALERT_RETENTION + 1);
        assert!(alerts.iter().any(|alert| alert.id == standing && !alert.resolved));
    }

    #[test]
    fn metrics_without_thresholds_never_alert() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        monitor.record_metric("anything", 1e12, None);
        assert!(monitor.get_alerts().is_empty());
    }
}
