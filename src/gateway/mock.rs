//! Mock gateway for testing without an upstream provider.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, trace};

use super::{Direction, FetchedPage, Gateway, GatewayError, RawMessageRecord, SendReceipt};

/// Scripted failure for a page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Non-success HTTP status
    Status(u16),
    /// Success status with an unparseable body
    Parse,
}

impl MockFailure {
    fn to_error(self) -> GatewayError {
        match self {
            MockFailure::Status(status) => GatewayError::Status {
                status,
                body: "mock upstream failure".to_string(),
            },
            MockFailure::Parse => GatewayError::Parse {
                body: "<html>mock</html>".to_string(),
            },
        }
    }
}

/// Request and send log entries kept; older entries are discarded so a
/// long-running `gateway.mock` deployment stays bounded.
pub const MOCK_LOG_CAPACITY: usize = 1024;

fn push_bounded<T>(log: &mut VecDeque<T>, entry: T) {
    if log.len() >= MOCK_LOG_CAPACITY {
        log.pop_front();
    }
    log.push_back(entry);
}

#[derive(Debug, Default)]
struct MockState {
    records: HashMap<Direction, Vec<RawMessageRecord>>,
    page_failures: HashMap<(Direction, u32), MockFailure>,
    failing_recipients: HashSet<String>,
    page_requests: VecDeque<(Direction, u32)>,
    sent: VecDeque<(String, String)>,
    balance: f64,
}

/// In-memory gateway that serves pages from a flat, newest-first record list.
///
/// Page `n` of size `s` is the slice `[(n-1)*s, n*s)`; pages past the end are
/// empty, like the real gateway.
#[derive(Debug, Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
    latency: Duration,
    message_counter: AtomicU64,
}

impl MockGateway {
    /// Create an empty mock gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the records served for a direction.
    pub fn with_records(self, direction: Direction, records: Vec<RawMessageRecord>) -> Self {
        self.set_records(direction, records);
        self
    }

    /// Fail every request for the given page.
    pub fn with_page_failure(self, direction: Direction, page: u32, failure: MockFailure) -> Self {
        self.set_page_failure(direction, page, failure);
        self
    }

    /// Reject sends to the given recipient.
    pub fn with_failing_recipient(self, recipient: &str) -> Self {
        self.lock().failing_recipients.insert(recipient.to_string());
        self
    }

    /// Set the reported balance.
    pub fn with_balance(self, balance: f64) -> Self {
        self.lock().balance = balance;
        self
    }

    /// Set simulated latency for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Replace the records served for a direction.
    pub fn set_records(&self, direction: Direction, records: Vec<RawMessageRecord>) {
        self.lock().records.insert(direction, records);
    }

    /// Fail every request for the given page from now on.
    pub fn set_page_failure(&self, direction: Direction, page: u32, failure: MockFailure) {
        self.lock().page_failures.insert((direction, page), failure);
    }

    /// Remove a scripted page failure.
    pub fn clear_page_failure(&self, direction: Direction, page: u32) {
        self.lock().page_failures.remove(&(direction, page));
    }

    /// Pages requested for a direction, in request order (most recent
    /// [`MOCK_LOG_CAPACITY`] requests across both directions).
    pub fn page_requests(&self, direction: Direction) -> Vec<u32> {
        self.lock()
            .page_requests
            .iter()
            .filter(|(d, _)| *d == direction)
            .map(|(_, page)| *page)
            .collect()
    }

    /// Most recent accepted messages as `(recipient, body)`.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.lock().sent.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            trace!(latency_ms = self.latency.as_millis() as u64, "simulating latency");
            sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn fetch_page(
        &self,
        direction: Direction,
        page: u32,
        page_size: u32,
    ) -> Result<FetchedPage, GatewayError> {
        push_bounded(&mut self.lock().page_requests, (direction, page));
        self.simulate_latency().await;

        let state = self.lock();
        if let Some(failure) = state.page_failures.get(&(direction, page)) {
            debug!(direction = %direction, page, "mock page failure");
            return Err(failure.to_error());
        }

        let records = state.records.get(&direction).map(Vec::as_slice).unwrap_or(&[]);
        let start = (page.saturating_sub(1) as usize).saturating_mul(page_size as usize);
        let end = start.saturating_add(page_size as usize).min(records.len());

        if start >= records.len() {
            return Ok(FetchedPage::default());
        }
        Ok(FetchedPage::complete(records[start..end].to_vec()))
    }

    async fn send_message(&self, recipient: &str, body: &str) -> Result<SendReceipt, GatewayError> {
        self.simulate_latency().await;

        let mut state = self.lock();
        if state.failing_recipients.contains(recipient) {
            debug!(recipient, "mock send rejected");
            return Err(GatewayError::Rejected {
                reason: format!("invalid recipient {}", recipient),
            });
        }

        push_bounded(&mut state.sent, (recipient.to_string(), body.to_string()));
        let id = self.message_counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(SendReceipt {
            message_id: Some(format!("mock-{}", id)),
        })
    }

    async fn balance(&self) -> Result<f64, GatewayError> {
        self.simulate_latency().await;
        Ok(self.lock().balance)
    }
}
