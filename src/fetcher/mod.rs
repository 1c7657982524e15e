//! Paginated history walks against the gateway.
//!
//! The gateway returns pages newest-first within a direction and an empty
//! page once history is exhausted. A walk requests pages strictly in order;
//! the date-window early exit depends on that ordering.
//!
//! Exhaustion is judged by the entries the gateway put on the page, not by
//! the records that survived coercion. A page whose entries were all
//! unusable is skipped, not treated as the end of history.

pub mod ratelimit;

pub use ratelimit::{FixedDelay, RateLimiter, TokenBucket};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::gateway::{Direction, FetchedPage, GatewayError, RawMessageRecord, SharedGateway};
use crate::telemetry::counters;

/// Default records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default upper bound on pages per walk.
pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// Inclusive time window. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn new(after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Self {
        Self { after, before }
    }

    /// Window with no bounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// True if at least one bound is set.
    pub fn is_bounded(&self) -> bool {
        self.after.is_some() || self.before.is_some()
    }

    /// True if `ts` lies inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.after.map_or(true, |after| ts >= after) && self.before.map_or(true, |before| ts <= before)
    }
}

/// Walks gateway pages for one direction.
#[derive(Debug)]
pub struct PaginatedFetcher {
    gateway: SharedGateway,
    limiter: Arc<dyn RateLimiter>,
    page_size: u32,
    max_pages: u32,
}

impl PaginatedFetcher {
    /// Create a fetcher with default page size and page cap.
    pub fn new(gateway: SharedGateway, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            gateway,
            limiter,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Set page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the page cap.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Fetch every record for `direction`, optionally limited to `window`.
    ///
    /// With a bounded window only in-window records are kept, and the walk
    /// stops at the first page with no in-window record. The limiter is
    /// awaited after every page, the last one included. Any page failure
    /// aborts the walk; records gathered so far are discarded.
    pub async fn fetch_all(
        &self,
        direction: Direction,
        window: DateWindow,
    ) -> Result<Vec<RawMessageRecord>, GatewayError> {
        let started = Instant::now();
        let bounded = window.is_bounded();
        let mut collected: Vec<RawMessageRecord> = Vec::new();
        let mut page = 1u32;

        loop {
            let fetched = match self.gateway.fetch_page(direction, page, self.page_size).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(
                        direction = %direction,
                        page,
                        discarded = collected.len(),
                        error = %e,
                        "page fetch failed, aborting walk"
                    );
                    return Err(e);
                }
            };
            counters::page_fetched(direction.as_str());

            let mut done = fetched.is_exhausted();
            let FetchedPage { records, received } = fetched;

            if !done && records.is_empty() {
                debug!(direction = %direction, page, received, "no usable records on page, continuing");
            } else if !done {
                if bounded {
                    let kept_before = collected.len();
                    collected.extend(records.into_iter().filter(|r| window.contains(r.timestamp)));
                    if collected.len() == kept_before {
                        debug!(direction = %direction, page, "page outside date window, stopping");
                        done = true;
                    }
                } else {
                    collected.extend(records);
                }
            }

            debug!(direction = %direction, page, received, total = collected.len(), "page processed");

            self.limiter.acquire().await;

            if done {
                break;
            }

            if page >= self.max_pages {
                warn!(
                    direction = %direction,
                    max_pages = self.max_pages,
                    "page cap reached before gateway ran out of pages"
                );
                break;
            }

            page += 1;
        }

        info!(
            direction = %direction,
            pages = page,
            records = collected.len(),
            bounded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "history walk complete"
        );

        Ok(collected)
    }
}
