//! HTTP API server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::bootstrap::Shutdown;
use crate::cache::MessageCache;
use crate::query::QueryService;
use crate::sms::SmsService;
use crate::telemetry::Metrics;

use super::handlers::{
    balance_handler, health_handler, inbox_background_fetch_handler, inbox_cache_status_handler,
    inbox_handler, live_handler, metrics_handler, send_handler, sent_background_fetch_handler,
    sent_cache_status_handler, sent_handler, stats_handler,
};

/// Shared state for API handlers.
#[derive(Debug)]
pub struct ApiState {
    pub(super) query: Arc<QueryService>,
    pub(super) cache: Arc<MessageCache>,
    pub(super) sms: Arc<SmsService>,
    pub(super) metrics: Option<Arc<Metrics>>,
    start_time: Instant,
    healthy: AtomicBool,
    list_requests: AtomicU64,
    refreshes_started: AtomicU64,
    sms_sent: AtomicU64,
    sms_failed: AtomicU64,
}

impl ApiState {
    pub fn new(query: Arc<QueryService>, cache: Arc<MessageCache>, sms: Arc<SmsService>) -> Self {
        Self {
            query,
            cache,
            sms,
            metrics: None,
            start_time: Instant::now(),
            healthy: AtomicBool::new(true),
            list_requests: AtomicU64::new(0),
            refreshes_started: AtomicU64::new(0),
            sms_sent: AtomicU64::new(0),
            sms_failed: AtomicU64::new(0),
        }
    }

    /// Expose `metrics` at `/metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if healthy.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Set health status.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn inc_list_requests(&self) {
        self.list_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn list_requests(&self) -> u64 {
        self.list_requests.load(Ordering::Relaxed)
    }

    pub fn inc_refreshes_started(&self) {
        self.refreshes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refreshes_started(&self) -> u64 {
        self.refreshes_started.load(Ordering::Relaxed)
    }

    pub fn record_sends(&self, sent: u64, failed: u64) {
        self.sms_sent.fetch_add(sent, Ordering::Relaxed);
        self.sms_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn sms_sent(&self) -> u64 {
        self.sms_sent.load(Ordering::Relaxed)
    }

    pub fn sms_failed(&self) -> u64 {
        self.sms_failed.load(Ordering::Relaxed)
    }
}

/// Build the API router.
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Message history
        .route("/messages/sent", get(sent_handler))
        .route("/messages/inbox", get(inbox_handler))
        .route("/messages/background-fetch", post(sent_background_fetch_handler))
        .route("/messages/inbox/background-fetch", post(inbox_background_fetch_handler))
        .route("/messages/cache-status", get(sent_cache_status_handler))
        .route("/messages/inbox/cache-status", get(inbox_cache_status_handler))
        // Sending
        .route("/sms/send", post(send_handler))
        .route("/sms/balance", get(balance_handler))
        // Health, stats and metrics
        .route("/healthz", get(health_handler))
        .route("/livez", get(live_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// API HTTP server.
pub struct ApiServer {
    address: SocketAddr,
    state: Arc<ApiState>,
    shutdown: Arc<Shutdown>,
}

impl ApiServer {
    /// Create a new API server.
    pub fn new(address: SocketAddr, state: Arc<ApiState>, shutdown: Arc<Shutdown>) -> Self {
        Self {
            address,
            state,
            shutdown,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self) -> std::io::Result<()> {
        info!(address = %self.address, "starting API server");
        let listener = TcpListener::bind(self.address).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown starts, then let
    /// in-flight requests finish.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let router = build_router(self.state);
        let shutdown = self.shutdown;

        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "API server listening");
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.stopping().await;
                info!("API server shutting down");
            })
            .await?;

        Ok(())
    }
}
