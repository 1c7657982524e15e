//! Upstream SMS gateway access.
//!
//! The [`Gateway`] trait is the only way the rest of the crate talks to the
//! SMS provider:
//! - [`HttpGateway`]: authenticated REST client (production)
//! - [`MockGateway`]: scripted in-memory gateway (tests, demos)

mod client;
pub mod mock;
mod types;

pub use client::HttpGateway;
pub use mock::{MockFailure, MockGateway};
pub use types::{parse_gateway_timestamp, Direction, RawMessageRecord, DEFAULT_CREDIT_COST};
pub(crate) use types::{WireMessage, WireMessageList};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Longest upstream body kept in errors and logs.
pub const MAX_ERROR_BODY: usize = 512;

/// Gateway error.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Upstream answered with a non-success status.
    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Upstream answered successfully but the body was not the expected shape.
    #[error("failed to parse gateway response: {body}")]
    Parse { body: String },

    /// Upstream accepted the request but reported a failure in the body.
    #[error("gateway rejected request: {reason}")]
    Rejected { reason: String },

    /// Request never completed (connect, DNS, TLS, body read).
    #[error("gateway request failed: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Short error class, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Status { .. } => "status",
            GatewayError::Parse { .. } => "parse",
            GatewayError::Rejected { .. } => "rejected",
            GatewayError::Transport(_) => "transport",
        }
    }
}

/// Truncate an upstream body to [`MAX_ERROR_BODY`] bytes on a char boundary.
pub fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Receipt for a single accepted send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// One page of history as the gateway returned it.
///
/// `received` counts entries on the wire, before coercion dropped any
/// unusable ones. Exhaustion is decided from `received`, never from
/// `records`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    /// Records that survived coercion, in gateway order
    pub records: Vec<RawMessageRecord>,
    /// Entries on the page before coercion
    pub received: usize,
}

impl FetchedPage {
    /// Page where every entry was usable.
    pub fn complete(records: Vec<RawMessageRecord>) -> Self {
        let received = records.len();
        Self { records, received }
    }

    /// The gateway returned no entries: history is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.received == 0
    }

    /// Entries dropped during coercion.
    pub fn dropped(&self) -> usize {
        self.received.saturating_sub(self.records.len())
    }
}

/// SMS gateway operations.
#[async_trait]
pub trait Gateway: Send + Sync + std::fmt::Debug {
    /// Fetch one page of message history (1-based page numbers).
    async fn fetch_page(
        &self,
        direction: Direction,
        page: u32,
        page_size: u32,
    ) -> Result<FetchedPage, GatewayError>;

    /// Send one message to one recipient.
    async fn send_message(&self, recipient: &str, body: &str) -> Result<SendReceipt, GatewayError>;

    /// Current account credit balance.
    async fn balance(&self) -> Result<f64, GatewayError>;
}

/// Shared gateway handle.
pub type SharedGateway = Arc<dyn Gateway>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_body() {
        assert_eq!(truncate_body("rate limited"), "rate limited");
    }

    #[test]
    fn test_truncate_long_body_on_char_boundary() {
        let body = "é".repeat(400);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= MAX_ERROR_BODY + 3);
    }

    #[test]
    fn test_fetched_page_counts_wire_entries() {
        let page = FetchedPage {
            records: Vec::new(),
            received: 3,
        };
        assert!(!page.is_exhausted());
        assert_eq!(page.dropped(), 3);

        assert!(FetchedPage::complete(Vec::new()).is_exhausted());
    }

    #[test]
    fn test_error_kind() {
        let err = GatewayError::Status {
            status: 429,
            body: "slow down".into(),
        };
        assert_eq!(err.kind(), "status");
        assert_eq!(err.to_string(), "gateway returned status 429: slow down");
    }
}
