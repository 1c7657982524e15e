//! Read side used by the HTTP layer.
//!
//! Each list call picks a record source per request: the cached snapshot
//! when allowed and non-empty, otherwise a direct bounded walk. Direct walks
//! never write to the cache.

mod pagination;

pub use pagination::{paginate, PageRequest, Pagination, DEFAULT_LIMIT, DEFAULT_PAGE};

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::cache::MessageCache;
use crate::fetcher::{DateWindow, PaginatedFetcher};
use crate::gateway::{Direction, GatewayError, RawMessageRecord};
use crate::grouping::{self, MessageGroup};
use crate::telemetry::counters;

/// Unparseable date query parameter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid date '{value}': expected RFC 3339 timestamp or YYYY-MM-DD")]
pub struct DateParseError {
    pub value: String,
}

/// Parse an `afterDate`/`beforeDate` value.
///
/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates; a bare date is
/// midnight UTC of that day.
pub fn parse_date_param(value: &str) -> Result<DateTime<Utc>, DateParseError> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| DateParseError {
            value: value.to_string(),
        })
}

/// One list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub page: PageRequest,
    pub window: DateWindow,
    pub use_cache: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: PageRequest::default(),
            window: DateWindow::unbounded(),
            use_cache: true,
        }
    }
}

/// Where a list response came from and how fresh the cache is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMetadata {
    pub from_cache: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_updating: bool,
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
    pub metadata: ListMetadata,
}

/// Paginated, optionally date-filtered history views.
#[derive(Debug)]
pub struct QueryService {
    cache: Arc<MessageCache>,
    fetcher: Arc<PaginatedFetcher>,
}

impl QueryService {
    pub fn new(cache: Arc<MessageCache>, fetcher: Arc<PaginatedFetcher>) -> Self {
        Self { cache, fetcher }
    }

    /// Sent messages grouped by text, most recent first.
    pub async fn list_sent(&self, query: &ListQuery) -> Result<Page<MessageGroup>, GatewayError> {
        let direction = Direction::Outbound;
        let snapshot = self.cache.read(direction);
        let from_cache = query.use_cache && !snapshot.is_empty();

        let mut groups = if from_cache {
            grouping::group(
                snapshot
                    .records
                    .iter()
                    .filter(|r| query.window.contains(r.timestamp)),
            )
        } else {
            let records = self.fetcher.fetch_all(direction, query.window).await?;
            grouping::group(&records)
        };
        grouping::sort_by_recency(&mut groups);

        let (items, pagination) = paginate(groups, query.page);
        Ok(self.page(direction, "sent", items, pagination, from_cache))
    }

    /// Inbound messages, most recent first.
    pub async fn list_inbound(
        &self,
        query: &ListQuery,
    ) -> Result<Page<RawMessageRecord>, GatewayError> {
        let direction = Direction::Inbound;
        let snapshot = self.cache.read(direction);
        let from_cache = query.use_cache && !snapshot.is_empty();

        let (items, pagination) = if from_cache {
            let mut records: Vec<&RawMessageRecord> = snapshot
                .records
                .iter()
                .filter(|r| query.window.contains(r.timestamp))
                .collect();
            records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

            let (slice, pagination) = paginate(records, query.page);
            (slice.into_iter().cloned().collect(), pagination)
        } else {
            let mut records = self.fetcher.fetch_all(direction, query.window).await?;
            records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            paginate(records, query.page)
        };

        Ok(self.page(direction, "inbox", items, pagination, from_cache))
    }

    fn page<T>(
        &self,
        direction: Direction,
        endpoint: &str,
        items: Vec<T>,
        pagination: Pagination,
        from_cache: bool,
    ) -> Page<T> {
        let source = if from_cache { "cache" } else { "gateway" };
        counters::list_request(endpoint, source);
        debug!(
            endpoint,
            source,
            page = pagination.page,
            total = pagination.total,
            "list request served"
        );

        let status = self.cache.status(direction);
        Page {
            items,
            pagination,
            metadata: ListMetadata {
                from_cache,
                last_updated: status.last_updated,
                is_updating: status.is_updating,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FixedDelay;
    use crate::gateway::{MockFailure, MockGateway};
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    /// `groups` distinct texts, two recipients each, one hour apart, newest first.
    fn outbound(groups: usize) -> Vec<RawMessageRecord> {
        (0..groups)
            .flat_map(|i| {
                let ts = base() - Duration::hours(i as i64);
                let body = format!("notice {}", i);
                vec![
                    RawMessageRecord::outbound(format!("{}a", i), "+27831112222", body.clone(), ts, Some("delivered")),
                    RawMessageRecord::outbound(format!("{}b", i), "+27831113333", body, ts, Some("failed")),
                ]
            })
            .collect()
    }

    fn inbound(n: usize) -> Vec<RawMessageRecord> {
        (0..n)
            .map(|i| {
                RawMessageRecord::inbound(
                    format!("in-{}", i),
                    "+27834445555",
                    format!("reply {}", i),
                    base() - Duration::minutes(i as i64),
                )
            })
            .collect()
    }

    fn service(gateway: Arc<MockGateway>) -> (QueryService, Arc<MessageCache>) {
        let fetcher = Arc::new(
            PaginatedFetcher::new(gateway, Arc::new(FixedDelay::none())).with_page_size(10),
        );
        let cache = Arc::new(MessageCache::new(fetcher.clone()));
        (QueryService::new(cache.clone(), fetcher), cache)
    }

    #[test]
    fn test_parse_date_param() {
        assert_eq!(
            parse_date_param("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date_param("2024-03-01T14:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        );
        let err = parse_date_param("yesterday").unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }

    #[tokio::test]
    async fn test_second_page_from_cache() {
        let gateway = Arc::new(MockGateway::new().with_records(Direction::Outbound, outbound(25)));
        let (service, cache) = service(gateway.clone());
        cache.refresh(Direction::Outbound).await;
        let walked = gateway.page_requests(Direction::Outbound).len();

        let query = ListQuery {
            page: PageRequest::new(2, 10),
            ..ListQuery::default()
        };
        let page = service.list_sent(&query).await.unwrap();

        assert_eq!(page.items.len(), 10);
        assert_eq!(page.pagination.total, 25);
        assert!(page.pagination.has_more);
        assert!(page.metadata.from_cache);
        assert!(page.metadata.last_updated.is_some());
        assert_eq!(page.items[0].message, "notice 10");
        assert_eq!(page.items[0].status.delivered, 1);
        assert_eq!(page.items[0].status.failed, 1);
        assert_eq!(gateway.page_requests(Direction::Outbound).len(), walked);
    }

    #[tokio::test]
    async fn test_empty_cache_falls_through_to_gateway() {
        let gateway = Arc::new(MockGateway::new().with_records(Direction::Outbound, outbound(3)));
        let (service, cache) = service(gateway.clone());

        let page = service.list_sent(&ListQuery::default()).await.unwrap();

        assert_eq!(page.items.len(), 3);
        assert!(!page.metadata.from_cache);
        assert!(!gateway.page_requests(Direction::Outbound).is_empty());
        assert!(cache.read(Direction::Outbound).is_empty(), "direct fetch never fills the cache");
    }

    #[tokio::test]
    async fn test_use_cache_false_bypasses_snapshot() {
        let gateway = Arc::new(MockGateway::new().with_records(Direction::Outbound, outbound(3)));
        let (service, cache) = service(gateway.clone());
        cache.refresh(Direction::Outbound).await;

        gateway.set_records(Direction::Outbound, outbound(5));
        let query = ListQuery {
            use_cache: false,
            ..ListQuery::default()
        };
        let page = service.list_sent(&query).await.unwrap();

        assert_eq!(page.pagination.total, 5);
        assert!(!page.metadata.from_cache);
        assert_eq!(cache.read(Direction::Outbound).records.len(), 6);
    }

    #[tokio::test]
    async fn test_cached_view_applies_window() {
        let gateway = Arc::new(MockGateway::new().with_records(Direction::Outbound, outbound(10)));
        let (service, cache) = service(gateway);
        cache.refresh(Direction::Outbound).await;

        let query = ListQuery {
            window: DateWindow::new(Some(base() - Duration::hours(3)), Some(base() - Duration::hours(1))),
            ..ListQuery::default()
        };
        let page = service.list_sent(&query).await.unwrap();

        let texts: Vec<_> = page.items.iter().map(|g| g.message.as_str()).collect();
        assert_eq!(texts, vec!["notice 1", "notice 2", "notice 3"]);
    }

    #[tokio::test]
    async fn test_direct_fetch_error_propagates() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_records(Direction::Inbound, inbound(5))
                .with_page_failure(Direction::Inbound, 1, MockFailure::Status(503)),
        );
        let (service, _) = service(gateway);

        let err = service.list_inbound(&ListQuery::default()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_inbound_sorted_newest_first() {
        let mut records = inbound(12);
        records.reverse();
        let gateway = Arc::new(MockGateway::new().with_records(Direction::Inbound, records));
        let (service, cache) = service(gateway);
        cache.refresh(Direction::Inbound).await;

        let query = ListQuery {
            page: PageRequest::new(2, 5),
            ..ListQuery::default()
        };
        let page = service.list_inbound(&query).await.unwrap();

        let ids: Vec<_> = page.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["in-5", "in-6", "in-7", "in-8", "in-9"]);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.metadata.from_cache);
    }
}
