//! Service wiring.
//!
//! Builds every shared component from configuration:
//! - Gateway (HTTP client or in-memory mock)
//! - Paginated fetcher and its rate limiter
//! - Message cache
//! - Query and SMS services

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cache::MessageCache;
use crate::config::Config;
use crate::fetcher::{ratelimit, PaginatedFetcher};
use crate::gateway::{HttpGateway, MockGateway, SharedGateway};
use crate::query::QueryService;
use crate::sms::SmsService;

/// Shared services.
///
/// All fields are thread-safe and cheap to clone.
#[derive(Debug, Clone)]
pub struct Services {
    pub gateway: SharedGateway,
    pub fetcher: Arc<PaginatedFetcher>,
    pub cache: Arc<MessageCache>,
    pub query: Arc<QueryService>,
    pub sms: Arc<SmsService>,
}

impl Services {
    /// Build services from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let gateway: SharedGateway = if config.gateway.mock {
            info!("using in-memory mock gateway");
            Arc::new(MockGateway::new())
        } else {
            info!(base_url = %config.gateway.base_url, "using HTTP gateway");
            Arc::new(HttpGateway::new(&config.gateway).context("failed to create gateway client")?)
        };

        let limiter = ratelimit::from_config(&config.fetch.rate_limit);
        let fetcher = PaginatedFetcher::new(gateway.clone(), limiter)
            .with_page_size(config.fetch.page_size)
            .with_max_pages(config.fetch.max_pages);

        Ok(Self::with_fetcher(gateway, fetcher))
    }

    /// Build services around an existing gateway and fetcher.
    pub fn with_fetcher(gateway: SharedGateway, fetcher: PaginatedFetcher) -> Self {
        let fetcher = Arc::new(fetcher);
        let cache = Arc::new(MessageCache::new(fetcher.clone()));
        let query = Arc::new(QueryService::new(cache.clone(), fetcher.clone()));
        let sms = Arc::new(SmsService::new(gateway.clone()));

        Self {
            gateway,
            fetcher,
            cache,
            query,
            sms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Direction;

    #[tokio::test]
    async fn test_mock_services_from_config() {
        let config = Config::from_yaml("gateway:\n  mock: true\n").unwrap();
        let services = Services::from_config(&config).unwrap();

        assert!(services.cache.read(Direction::Outbound).is_empty());
        assert_eq!(services.sms.balance().await.unwrap(), 0.0);
    }

    #[test]
    fn test_http_services_from_config() {
        let config = Config::from_yaml(
            "gateway:\n  base_url: http://127.0.0.1:1/api\n  email: a@b.c\n  token: t\n",
        )
        .unwrap();
        assert!(Services::from_config(&config).is_ok());
    }
}
