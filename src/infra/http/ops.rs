//! Operator endpoint handlers.
//!
//! All bodies use camelCase keys. `/health/cache` intentionally answers
//! HTTP 200 even when the distributed tier is down: cache health is
//! advisory, so degradation is signaled in the body.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::cache::{HealthStatus, PerformanceReport, RemoteCounters};
use crate::monitor::{Alert, MetricSummary, PROMETHEUS_CONTENT_TYPE};

use super::OpsState;
use super::error::OpsError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub cache: PerformanceReport,
    pub redis: RedisSection,
    pub performance: BTreeMap<String, MetricSummary>,
    pub alerts: Vec<Alert>,
    pub summary: StatsSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisSection {
    pub health: HealthStatus,
    pub metrics: RemoteCounters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub overall_health: &'static str,
    pub cache_hit_rate: f64,
    pub average_response_time: f64,
    pub active_alerts: usize,
    pub recommendations: Vec<String>,
}

pub async fn cache_stats(State(state): State<OpsState>) -> Json<StatsResponse> {
    let health = state.remote.health_check().await;
    let report = state.manager.performance_report();
    let active_alerts = state.monitor.unresolved_alerts().len();

    let overall_health = if health.connected && active_alerts == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(StatsResponse {
        timestamp: OffsetDateTime::now_utc(),
        redis: RedisSection {
            health,
            metrics: state.remote.counters(),
        },
        performance: state.monitor.get_metrics(),
        alerts: state.monitor.get_alerts(),
        summary: StatsSummary {
            overall_health,
            cache_hit_rate: report.hit_rate,
            average_response_time: report.average_response_time_ms,
            active_alerts,
            recommendations: report.recommendations.clone(),
        },
        cache: report,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupResponse {
    pub success: bool,
    pub message: String,
    /// Wall-clock duration rendered as `"<ms>ms"`.
    pub duration: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

pub async fn cache_warmup(State(state): State<OpsState>) -> Json<WarmupResponse> {
    let report = state.manager.warm_up().await;
    Json(WarmupResponse {
        success: true,
        message: report.summary(),
        duration: format!("{}ms", report.duration_ms),
        timestamp: OffsetDateTime::now_utc(),
    })
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    format: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub alerts: Vec<Alert>,
    pub summary: MetricsSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_metrics: usize,
    pub total_alerts: usize,
    pub active_alerts: usize,
}

pub async fn performance_metrics(
    State(state): State<OpsState>,
    Query(query): Query<MetricsQuery>,
) -> Result<Response, OpsError> {
    match query.format.as_deref().unwrap_or("json") {
        "prometheus" => {
            let body = state.monitor.render_prometheus()?;
            Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response())
        }
        "json" => {
            let metrics = state.monitor.get_metrics();
            let alerts = state.monitor.get_alerts();
            let active_alerts = alerts.iter().filter(|alert| !alert.resolved).count();
            let response = MetricsResponse {
                timestamp: OffsetDateTime::now_utc(),
                summary: MetricsSummary {
                    total_metrics: metrics.len(),
                    total_alerts: alerts.len(),
                    active_alerts,
                },
                metrics,
                alerts,
            };
            Ok(Json(response).into_response())
        }
        other => Err(OpsError::bad_request(
            "Unsupported format",
            format!("unknown format `{other}`, expected `json` or `prometheus`"),
        )),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub success: bool,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

pub async fn resolve_alert(
    State(state): State<OpsState>,
    Path(alert_id): Path<String>,
) -> Result<Json<ResolveResponse>, OpsError> {
    let id = Uuid::parse_str(&alert_id)
        .map_err(|err| OpsError::bad_request("Invalid alert id", err.to_string()))?;

    if !state.monitor.resolve_alert(id) {
        return Err(OpsError::not_found("Alert not found"));
    }

    Ok(Json(ResolveResponse {
        success: true,
        message: format!("Alert {id} resolved"),
        timestamp: OffsetDateTime::now_utc(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealthResponse {
    pub service: &'static str,
    pub status: &'static str,
    pub response_time: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub details: HealthStatus,
}

pub async fn cache_health(State(state): State<OpsState>) -> Json<CacheHealthResponse> {
    let details = state.remote.health_check().await;
    Json(CacheHealthResponse {
        service: "cache",
        status: if details.connected {
            "healthy"
        } else {
            "degraded"
        },
        response_time: details.latency_ms,
        timestamp: OffsetDateTime::now_utc(),
        details,
    })
}
