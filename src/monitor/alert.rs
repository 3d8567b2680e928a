//! Threshold alerts.
//!
//! At most one unresolved alert exists per metric. A repeat breach while
//! unresolved updates the existing record in place; resolution is one-way
//! and explicit, so a fresh breach afterwards gets a new id.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub severity: AlertSeverity,
    pub metric: String,
    pub message: String,
    pub current_value: f64,
    pub threshold: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub resolved: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
}

impl Alert {
    pub(super) fn raise(
        metric: &str,
        severity: AlertSeverity,
        current_value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            metric: metric.to_string(),
            message: breach_message(metric, severity, current_value, threshold),
            current_value,
            threshold,
            timestamp: OffsetDateTime::now_utc(),
            resolved: false,
            resolved_at: None,
        }
    }

    /// Refreshes an unresolved alert after a repeat breach. The id is kept;
    /// severity may move in either direction with the aggregate.
    pub(super) fn refresh(
        &mut self,
        severity: AlertSeverity,
        current_value: f64,
        threshold: f64,
    ) {
        self.severity = severity;
        self.current_value = current_value;
        self.threshold = threshold;
        self.timestamp = OffsetDateTime::now_utc();
        self.message = breach_message(&self.metric, severity, current_value, threshold);
    }

    pub(super) fn resolve(&mut self) {
        self.resolved = true;
        self.resolved_at = Some(OffsetDateTime::now_utc());
    }
}

fn breach_message(
    metric: &str,
    severity: AlertSeverity,
    current_value: f64,
    threshold: f64,
) -> String {
    format!(
        "{metric} at {current_value:.2} breached the {} threshold {threshold}",
        severity.as_str()
    )
}
