//! API handlers.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::RefreshTrigger;
use crate::fetcher::DateWindow;
use crate::gateway::{Direction, GatewayError, RawMessageRecord};
use crate::grouping::MessageGroup;
use crate::query::{
    parse_date_param, DateParseError, ListMetadata, ListQuery, Page, PageRequest, Pagination,
    DEFAULT_LIMIT, DEFAULT_PAGE,
};
use crate::sms::{SendFailure, SendRequest, SendResult, SmsError};

use super::ApiState;

// ============================================================================
// Errors
// ============================================================================

/// Request failure, rendered as `{success: false, error}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Upstream gateway failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Client sent something unusable
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<DateParseError> for ApiError {
    fn from(e: DateParseError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<SmsError> for ApiError {
    fn from(e: SmsError) -> Self {
        match e {
            SmsError::Validation(msg) => ApiError::BadRequest(msg),
            SmsError::Gateway(e) => ApiError::Gateway(e),
        }
    }
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Gateway(ref e) = self {
            warn!(error = %e, kind = e.kind(), "gateway error surfaced to client");
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Message history
// ============================================================================

/// Query string for list endpoints.
///
/// Fields stay strings so malformed values get a JSON error body instead of
/// the extractor's plain-text rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub after_date: Option<String>,
    pub before_date: Option<String>,
    pub use_cache: Option<String>,
}

impl ListParams {
    /// Convert to a [`ListQuery`], clamping page and limit to at least 1.
    pub fn to_query(&self) -> Result<ListQuery, ApiError> {
        let page = parse_count("page", self.page.as_deref(), DEFAULT_PAGE)?;
        let limit = parse_count("limit", self.limit.as_deref(), DEFAULT_LIMIT)?;

        let after = self.after_date.as_deref().map(parse_date_param).transpose()?;
        let before = self.before_date.as_deref().map(parse_date_param).transpose()?;

        Ok(ListQuery {
            page: PageRequest::new(page, limit),
            window: DateWindow::new(after, before),
            use_cache: self.use_cache.as_deref() != Some("false"),
        })
    }
}

fn parse_count(name: &str, value: Option<&str>, default: u32) -> Result<u32, ApiError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };

    value
        .parse::<i64>()
        .map(|n| n.clamp(1, u32::MAX as i64) as u32)
        .map_err(|_| ApiError::BadRequest(format!("invalid {}: '{}'", name, value)))
}

/// List response.
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub success: bool,
    pub messages: Vec<T>,
    pub pagination: Pagination,
    pub metadata: ListMetadata,
}

impl<T> From<Page<T>> for ListResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            success: true,
            messages: page.items,
            pagination: page.pagination,
            metadata: page.metadata,
        }
    }
}

/// GET /messages/sent - grouped outbound history
pub async fn sent_handler(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse<MessageGroup>>, ApiError> {
    state.inc_list_requests();
    let query = params.to_query()?;
    let page = state.query.list_sent(&query).await?;
    Ok(Json(page.into()))
}

/// GET /messages/inbox - inbound history
pub async fn inbox_handler(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse<RawMessageRecord>>, ApiError> {
    state.inc_list_requests();
    let query = params.to_query()?;
    let page = state.query.list_inbound(&query).await?;
    Ok(Json(page.into()))
}

/// Background refresh response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundFetchResponse {
    pub success: bool,
    pub status: RefreshTrigger,
    pub last_updated: Option<DateTime<Utc>>,
}

fn trigger(state: &ApiState, direction: Direction) -> Json<BackgroundFetchResponse> {
    let status = state.cache.trigger_refresh(direction);
    if status == RefreshTrigger::Started {
        state.inc_refreshes_started();
        info!(direction = %direction, "background refresh requested");
    }

    Json(BackgroundFetchResponse {
        success: true,
        status,
        last_updated: state.cache.status(direction).last_updated,
    })
}

/// POST /messages/background-fetch - refresh the outbound cache
pub async fn sent_background_fetch_handler(
    State(state): State<Arc<ApiState>>,
) -> Json<BackgroundFetchResponse> {
    trigger(&state, Direction::Outbound)
}

/// POST /messages/inbox/background-fetch - refresh the inbound cache
pub async fn inbox_background_fetch_handler(
    State(state): State<Arc<ApiState>>,
) -> Json<BackgroundFetchResponse> {
    trigger(&state, Direction::Inbound)
}

/// Cache status response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatusResponse {
    pub success: bool,
    pub is_updating: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub total_messages: usize,
}

fn cache_status(state: &ApiState, direction: Direction) -> Json<CacheStatusResponse> {
    let status = state.cache.status(direction);
    Json(CacheStatusResponse {
        success: true,
        is_updating: status.is_updating,
        last_updated: status.last_updated,
        total_messages: status.record_count,
    })
}

/// GET /messages/cache-status
pub async fn sent_cache_status_handler(
    State(state): State<Arc<ApiState>>,
) -> Json<CacheStatusResponse> {
    cache_status(&state, Direction::Outbound)
}

/// GET /messages/inbox/cache-status
pub async fn inbox_cache_status_handler(
    State(state): State<Arc<ApiState>>,
) -> Json<CacheStatusResponse> {
    cache_status(&state, Direction::Inbound)
}

// ============================================================================
// Sending
// ============================================================================

/// Bulk send response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub results: Vec<SendResult>,
    pub total_sent: usize,
    pub total_failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SendFailure>,
}

/// POST /sms/send - send one message to many recipients
///
/// 200 when at least one recipient was reached, 502 when none were.
pub async fn send_handler(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SendResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let report = state.sms.send_bulk(&request).await?;
    state.record_sends(report.total_sent as u64, report.total_failed as u64);

    let status = if report.success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };

    Ok((
        status,
        Json(SendResponse {
            success: report.success(),
            total_sent: report.total_sent,
            total_failed: report.total_failed,
            results: report.results,
            errors: report.errors,
        }),
    ))
}

/// Balance response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub success: bool,
    pub balance: f64,
}

/// GET /sms/balance
pub async fn balance_handler(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.sms.balance().await?;
    Ok(Json(BalanceResponse {
        success: true,
        balance,
    }))
}

// ============================================================================
// Health, stats and metrics
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check handler.
pub async fn health_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: if state.is_healthy() { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if state.is_healthy() {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Live handler (for Kubernetes).
pub async fn live_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Stats response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub list_requests: u64,
    pub refreshes_started: u64,
    pub sms: SmsStats,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsStats {
    pub sent: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub outbound: usize,
    pub inbound: usize,
}

/// Stats handler.
pub async fn stats_handler(State(state): State<Arc<ApiState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        uptime_seconds: state.uptime().as_secs(),
        list_requests: state.list_requests(),
        refreshes_started: state.refreshes_started(),
        sms: SmsStats {
            sent: state.sms_sent(),
            failed: state.sms_failed(),
        },
        cache: CacheStats {
            outbound: state.cache.status(Direction::Outbound).record_count,
            inbound: state.cache.status(Direction::Inbound).record_count,
        },
    })
}

/// Metrics handler (Prometheus format).
pub async fn metrics_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.metrics {
        Some(ref metrics) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain; charset=utf-8")],
            "metrics not enabled".to_string(),
        ),
    }
}
