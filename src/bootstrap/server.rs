use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, span, warn, Level};

use crate::api::{ApiServer, ApiState};
use crate::config::Config;
use crate::gateway::Direction;
use crate::telemetry::Metrics;

use super::refresher::CacheRefresher;
use super::shutdown::Shutdown;
use super::state::Services;

/// Main smsdesk server
///
/// Components:
/// - API server: dashboard endpoints, health, stats and metrics
/// - Cache refresher: optional periodic background refresh
/// - Shutdown: signal handling and graceful drain with configurable timeout
pub struct Server {
    config: Arc<Config>,
    services: Services,
    shutdown: Arc<Shutdown>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Result<Self> {
        let services = Services::from_config(&config)?;
        let shutdown = Shutdown::new(config.settings.shutdown.drain_timeout);

        Ok(Self {
            config: Arc::new(config),
            services,
            shutdown,
        })
    }

    /// Run the server until shutdown
    pub async fn run(self) -> Result<()> {
        let span = span!(Level::INFO, "smsdesk", version = env!("CARGO_PKG_VERSION"));
        let _enter = span.enter();

        let metrics = Metrics::global().context("failed to initialize metrics")?;

        let state = Arc::new(
            ApiState::new(
                self.services.query.clone(),
                self.services.cache.clone(),
                self.services.sms.clone(),
            )
            .with_metrics(metrics),
        );

        let api = ApiServer::new(self.config.server.address, state.clone(), self.shutdown.clone());
        let mut api_handle = tokio::spawn(api.run());

        if self.config.cache.warm_on_start {
            for direction in Direction::ALL {
                self.services.cache.trigger_refresh(direction);
            }
            info!("cache warm-up started");
        }

        let refresher_handle = self.config.cache.refresh_interval.map(|period| {
            let refresher = CacheRefresher::new(self.services.cache.clone(), period, &self.shutdown);
            tokio::spawn(refresher.run())
        });

        info!(
            address = %self.config.server.address,
            gateway = if self.config.gateway.mock { "mock" } else { "http" },
            page_size = self.config.fetch.page_size,
            warm_on_start = self.config.cache.warm_on_start,
            refresh_interval_secs = self.config.cache.refresh_interval.map(|d| d.as_secs()),
            drain_timeout_secs = self.shutdown.drain_timeout().as_secs(),
            "smsdesk server started"
        );

        // Wait for a signal, or for the API server to die on its own
        tokio::select! {
            _ = wait_for_signal() => {
                info!("shutdown signal received, starting graceful shutdown");
            }
            result = &mut api_handle => {
                self.shutdown.terminate();
                crate::telemetry::shutdown_tracing();
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e).context("API server failed"),
                    Err(e) => Err(e).context("API server task panicked"),
                };
            }
        }

        state.set_healthy(false);
        self.shutdown.start_drain();

        // Let in-flight requests finish
        match tokio::time::timeout(self.shutdown.drain_timeout(), &mut api_handle).await {
            Ok(Ok(Ok(()))) => info!("API server drained"),
            Ok(Ok(Err(e))) => error!(error = %e, "API server failed during drain"),
            Ok(Err(e)) => error!(error = %e, "API server task panicked"),
            Err(_) => {
                warn!("drain timeout reached, forcing shutdown");
                api_handle.abort();
            }
        }

        if let Some(handle) = refresher_handle {
            let _ = handle.await;
        }

        self.shutdown.terminate();

        // Flush tracing
        crate::telemetry::shutdown_tracing();

        info!("smsdesk server stopped");

        Ok(())
    }

    /// Shared services (for embedding and tests)
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Shutdown handle
    pub fn shutdown(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("received SIGTERM");
        }
    }
}
