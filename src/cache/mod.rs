//! In-process message history cache.
//!
//! One [`CachePage`] per direction holds the last complete history walk.
//! Readers get an `Arc` snapshot and never block on a refresh. A refresh
//! builds a new page off to the side and swaps it in with a single pointer
//! store; a failed refresh leaves the old page in place.
//!
//! At most one refresh runs per direction. The right to refresh is claimed
//! with a compare-and-swap on the direction's `updating` flag and released
//! by [`RefreshGuard`] on drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::fetcher::{DateWindow, PaginatedFetcher};
use crate::gateway::{Direction, RawMessageRecord};
use crate::telemetry::counters;

/// Immutable snapshot of one direction's history.
#[derive(Debug, Clone, Default)]
pub struct CachePage {
    /// Records in gateway order (newest first)
    pub records: Vec<RawMessageRecord>,
    /// Completion time of the walk that produced this page
    pub last_updated: Option<DateTime<Utc>>,
}

impl CachePage {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Refresh state for one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub is_updating: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub record_count: usize,
}

/// Result of a fire-and-forget refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// A new refresh was spawned
    Started,
    /// A refresh for this direction was already running
    InProgress,
}

/// Result of an awaited refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Snapshot replaced
    Refreshed { records: usize },
    /// Walk failed; previous snapshot kept
    Failed { error: String },
    /// Another refresh held the single-flight right
    InProgress,
}

#[derive(Debug, Default)]
struct Slot {
    page: RwLock<Arc<CachePage>>,
    updating: AtomicBool,
}

impl Slot {
    fn snapshot(&self) -> Arc<CachePage> {
        self.page.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace(&self, page: CachePage) {
        let page = Arc::new(page);
        *self.page.write().unwrap_or_else(|e| e.into_inner()) = page;
    }
}

/// Single-flight right for one direction. Dropping it clears the flag.
#[derive(Debug)]
pub struct RefreshGuard {
    slot: Arc<Slot>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.slot.updating.store(false, Ordering::Release);
    }
}

/// Per-direction history cache.
#[derive(Debug)]
pub struct MessageCache {
    fetcher: Arc<PaginatedFetcher>,
    outbound: Arc<Slot>,
    inbound: Arc<Slot>,
}

impl MessageCache {
    /// Create an empty cache.
    pub fn new(fetcher: Arc<PaginatedFetcher>) -> Self {
        Self {
            fetcher,
            outbound: Arc::new(Slot::default()),
            inbound: Arc::new(Slot::default()),
        }
    }

    fn slot(&self, direction: Direction) -> &Arc<Slot> {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    /// Current snapshot, possibly empty or stale.
    pub fn read(&self, direction: Direction) -> Arc<CachePage> {
        self.slot(direction).snapshot()
    }

    /// Refresh state.
    pub fn status(&self, direction: Direction) -> CacheStatus {
        let slot = self.slot(direction);
        let page = slot.snapshot();
        CacheStatus {
            is_updating: slot.updating.load(Ordering::Acquire),
            last_updated: page.last_updated,
            record_count: page.records.len(),
        }
    }

    /// Claim the single-flight right for `direction`.
    pub fn try_claim(&self, direction: Direction) -> Option<RefreshGuard> {
        let slot = self.slot(direction);
        slot.updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard { slot: slot.clone() })
    }

    /// Refresh `direction` and wait for the result.
    pub async fn refresh(&self, direction: Direction) -> RefreshOutcome {
        match self.try_claim(direction) {
            Some(guard) => self.run_refresh(direction, guard).await,
            None => {
                debug!(direction = %direction, "refresh already in progress");
                RefreshOutcome::InProgress
            }
        }
    }

    /// Start a refresh in the background.
    ///
    /// The single-flight right is claimed before returning, so a second
    /// call made immediately after always reports `InProgress`.
    pub fn trigger_refresh(self: &Arc<Self>, direction: Direction) -> RefreshTrigger {
        let Some(guard) = self.try_claim(direction) else {
            debug!(direction = %direction, "background refresh already in progress");
            return RefreshTrigger::InProgress;
        };

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            cache.run_refresh(direction, guard).await;
        });

        RefreshTrigger::Started
    }

    async fn run_refresh(&self, direction: Direction, guard: RefreshGuard) -> RefreshOutcome {
        let started = Instant::now();
        info!(direction = %direction, "cache refresh started");

        let outcome = match self.fetcher.fetch_all(direction, DateWindow::unbounded()).await {
            Ok(records) => {
                let count = records.len();
                self.slot(direction).replace(CachePage {
                    records,
                    last_updated: Some(Utc::now()),
                });

                counters::cache_refresh(direction.as_str(), "ok");
                counters::cache_records_set(direction.as_str(), count as i64);
                info!(
                    direction = %direction,
                    records = count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "cache refresh complete"
                );
                RefreshOutcome::Refreshed { records: count }
            }
            Err(e) => {
                counters::cache_refresh(direction.as_str(), e.kind());
                error!(
                    direction = %direction,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "cache refresh failed, keeping previous snapshot"
                );
                RefreshOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        drop(guard);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FixedDelay;
    use crate::gateway::{MockFailure, MockGateway};
    use chrono::TimeZone;
    use std::time::Duration;

    fn records(n: usize) -> Vec<RawMessageRecord> {
        (0..n)
            .map(|i| {
                RawMessageRecord::outbound(
                    i.to_string(),
                    format!("+2783{:07}", i),
                    format!("notice {}", i),
                    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
                    Some("delivered"),
                )
            })
            .collect()
    }

    fn cache(gateway: Arc<MockGateway>) -> Arc<MessageCache> {
        let fetcher = PaginatedFetcher::new(gateway, Arc::new(FixedDelay::none())).with_page_size(10);
        Arc::new(MessageCache::new(Arc::new(fetcher)))
    }

    #[tokio::test]
    async fn test_starts_empty() {
        let cache = cache(Arc::new(MockGateway::new()));
        let status = cache.status(Direction::Outbound);

        assert!(cache.read(Direction::Outbound).is_empty());
        assert!(!status.is_updating);
        assert!(status.last_updated.is_none());
        assert_eq!(status.record_count, 0);
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let gateway = Arc::new(MockGateway::new().with_records(Direction::Outbound, records(12)));
        let cache = cache(gateway);

        let before = cache.read(Direction::Outbound);
        let outcome = cache.refresh(Direction::Outbound).await;

        assert_eq!(outcome, RefreshOutcome::Refreshed { records: 12 });
        assert!(before.is_empty(), "old snapshot is never mutated");
        assert_eq!(cache.read(Direction::Outbound).records.len(), 12);
        assert!(cache.status(Direction::Outbound).last_updated.is_some());
        assert!(cache.read(Direction::Inbound).is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let gateway = Arc::new(MockGateway::new().with_records(Direction::Outbound, records(5)));
        let cache = cache(gateway.clone());
        cache.refresh(Direction::Outbound).await;
        let last_updated = cache.status(Direction::Outbound).last_updated;

        gateway.set_records(Direction::Outbound, records(8));
        gateway.set_page_failure(Direction::Outbound, 1, MockFailure::Status(500));

        let outcome = cache.refresh(Direction::Outbound).await;
        assert!(matches!(outcome, RefreshOutcome::Failed { ref error } if error.contains("500")));

        let status = cache.status(Direction::Outbound);
        assert_eq!(status.record_count, 5);
        assert_eq!(status.last_updated, last_updated);
        assert!(!status.is_updating);

        gateway.clear_page_failure(Direction::Outbound, 1);
        assert_eq!(
            cache.refresh(Direction::Outbound).await,
            RefreshOutcome::Refreshed { records: 8 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_is_single_flight() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_records(Direction::Outbound, records(15))
                .with_latency(Duration::from_millis(50)),
        );
        let cache = cache(gateway.clone());

        assert_eq!(cache.trigger_refresh(Direction::Outbound), RefreshTrigger::Started);
        assert_eq!(cache.trigger_refresh(Direction::Outbound), RefreshTrigger::InProgress);
        assert_eq!(cache.refresh(Direction::Outbound).await, RefreshOutcome::InProgress);
        assert!(cache.status(Direction::Outbound).is_updating);

        // Inbound is independent.
        assert_eq!(cache.trigger_refresh(Direction::Inbound), RefreshTrigger::Started);

        while cache.status(Direction::Outbound).is_updating {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // One walk: pages 1, 2 and the empty page 3.
        assert_eq!(gateway.page_requests(Direction::Outbound), vec![1, 2, 3]);
        assert_eq!(cache.read(Direction::Outbound).records.len(), 15);
        assert_eq!(cache.trigger_refresh(Direction::Outbound), RefreshTrigger::Started);
    }

    #[tokio::test]
    async fn test_guard_releases_flag() {
        let cache = cache(Arc::new(MockGateway::new()));
        let guard = cache.try_claim(Direction::Inbound).unwrap();
        assert!(cache.try_claim(Direction::Inbound).is_none());
        assert!(cache.status(Direction::Inbound).is_updating);

        drop(guard);
        assert!(cache.try_claim(Direction::Inbound).is_some());
    }
}
