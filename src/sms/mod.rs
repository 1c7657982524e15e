//! Bulk send and balance relay.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::gateway::{GatewayError, SharedGateway};
use crate::telemetry::counters;

/// SMS service error
#[derive(Debug, Error)]
pub enum SmsError {
    /// Request failed validation before anything was sent
    #[error("{0}")]
    Validation(String),

    /// Gateway call failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Bulk send request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Accepted send for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub recipient: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Failed send for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendFailure {
    pub recipient: String,
    pub error: String,
}

/// Outcome of a bulk send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSendReport {
    pub results: Vec<SendResult>,
    pub errors: Vec<SendFailure>,
    pub total_sent: usize,
    pub total_failed: usize,
}

impl BulkSendReport {
    /// At least one recipient was reached.
    pub fn success(&self) -> bool {
        self.total_sent > 0
    }

    /// Some sends succeeded and some failed.
    pub fn is_partial(&self) -> bool {
        self.total_sent > 0 && self.total_failed > 0
    }
}

/// Sends messages through the gateway.
#[derive(Debug, Clone)]
pub struct SmsService {
    gateway: SharedGateway,
}

impl SmsService {
    pub fn new(gateway: SharedGateway) -> Self {
        Self { gateway }
    }

    /// Send `request.message` to every recipient, one at a time.
    ///
    /// Every recipient is attempted; per-recipient failures are collected
    /// in the report rather than returned as an error.
    pub async fn send_bulk(&self, request: &SendRequest) -> Result<BulkSendReport, SmsError> {
        // Sent verbatim: groups are keyed on the exact body text.
        let message = request.message.as_str();
        if message.trim().is_empty() {
            return Err(SmsError::Validation("message is required".to_string()));
        }

        let recipients: Vec<&str> = request
            .recipients
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(SmsError::Validation(
                "at least one recipient is required".to_string(),
            ));
        }

        let mut report = BulkSendReport::default();

        for recipient in recipients {
            match self.gateway.send_message(recipient, message).await {
                Ok(receipt) => {
                    counters::sms_sent("ok");
                    report.total_sent += 1;
                    report.results.push(SendResult {
                        recipient: recipient.to_string(),
                        success: true,
                        message_id: receipt.message_id,
                    });
                }
                Err(e) => {
                    counters::sms_sent(e.kind());
                    warn!(recipient, error = %e, "send failed");
                    report.total_failed += 1;
                    report.errors.push(SendFailure {
                        recipient: recipient.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.is_partial() {
            warn!(
                sent = report.total_sent,
                failed = report.total_failed,
                "bulk send partially failed"
            );
        } else {
            info!(
                sent = report.total_sent,
                failed = report.total_failed,
                "bulk send complete"
            );
        }

        Ok(report)
    }

    /// Account credit balance.
    pub async fn balance(&self) -> Result<f64, SmsError> {
        Ok(self.gateway.balance().await?)
    }
}
