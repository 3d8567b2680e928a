//! Prometheus exposition rendering.
//!
//! One gauge per retained metric name, valued at its current window
//! aggregate. Output follows the text exposition line grammar: `# TYPE`
//! comments and `name value` sample lines.

use thiserror::Error;

use super::PerformanceMonitor;

/// Content type expected by Prometheus-compatible scrapers.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Rendering failure. Indicates a programming defect (a non-finite
/// aggregate reached the exporter), not an operational condition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("metric `{metric}` has a non-finite aggregate")]
    NonFinite { metric: String },
}

impl ExportError {
    pub fn non_finite(metric: impl Into<String>) -> Self {
        Self::NonFinite {
            metric: metric.into(),
        }
    }
}

impl PerformanceMonitor {
    /// Renders every retained metric as a Prometheus gauge.
    pub fn render_prometheus(&self) -> Result<String, ExportError> {
        let metrics = self.get_metrics();
        let mut out = String::new();
        for (name, summary) in metrics {
            if !summary.average.is_finite() {
                return Err(ExportError::non_finite(name));
            }
            let series = sanitize(&name);
            out.push_str(&format!("# TYPE {series} gauge\n"));
            out.push_str(&format!("{series} {}\n", summary.average));
        }
        Ok(out)
    }
}

/// Maps a metric name onto the exposition identifier alphabet
/// `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn sanitize(name: &str) -> String {
    let mut series: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if series
        .chars()
        .next()
        .is_none_or(|c| c.is_ascii_digit())
    {
        series.insert(0, '_');
    }
    series
}

#[cfg(test)]
mod tests {
    use super::super::MonitorConfig;
    use super::*;

    #[test]
    fn renders_a_recorded_metric_as_a_gauge_line() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        monitor.record_metric("cache_hit_rate", 0.87, None);

        let body = monitor.render_prometheus().unwrap();
        assert!(body.contains("# TYPE cache_hit_rate gauge\n"));
        assert!(body.contains("cache_hit_rate 0.87\n"));
    }

    #[test]
    fn every_line_matches_the_exposition_grammar() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        monitor.record_metric("cache_hit_rate", 0.87, None);
        monitor.record_metric("response time (ms)", 12.5, None);

        let body = monitor.render_prometheus().unwrap();
        for line in body.lines() {
            if let Some(comment) = line.strip_prefix('#') {
                assert!(!comment.is_empty());
                continue;
            }
            let mut parts = line.split_whitespace();
            let name = parts.next().unwrap();
            let value = parts.next().unwrap();
            assert_eq!(parts.next(), None);
            assert!(
                name.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
            );
            assert!(value.parse::<f64>().is_ok());
        }
    }

    #[test]
    fn non_finite_aggregate_is_an_export_error() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        monitor.record_metric("bad", f64::NAN, None);

        assert_eq!(
            monitor.render_prometheus(),
            Err(ExportError::non_finite("bad"))
        );
    }

    #[test]
    fn sanitize_rewrites_forbidden_characters() {
        assert_eq!(sanitize("response time (ms)"), "response_time__ms_");
        assert_eq!(sanitize("9lives"), "_9lives");
    }
}
