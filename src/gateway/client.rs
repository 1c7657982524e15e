//! HTTP gateway client.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::telemetry::counters;

use super::{
    truncate_body, Direction, FetchedPage, Gateway, GatewayError, RawMessageRecord,
    SendReceipt, WireMessageList,
};

/// REST client for the SMS gateway.
///
/// Every request carries the account `email` and API `token` headers.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    email: String,
    token: String,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .finish()
    }
}

impl HttpGateway {
    /// Create a new client from configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send an authenticated request and decode a JSON body.
    async fn execute<R: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<R, GatewayError> {
        let started = Instant::now();

        let result = self.execute_inner(operation, request).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        counters::gateway_request(operation, outcome, started.elapsed().as_secs_f64());

        result
    }

    async fn execute_inner<R: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<R, GatewayError> {
        let response = request
            .header("email", &self.email)
            .header("token", &self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(operation, error = %e, "gateway request failed");
                GatewayError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            let body = truncate_body(&body);
            warn!(
                operation,
                status = status.as_u16(),
                body = %body,
                "gateway returned error status"
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            let body = truncate_body(&body);
            warn!(operation, error = %e, body = %body, "unexpected gateway response");
            GatewayError::Parse { body }
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendPayload<'a> {
    recipient_number: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    #[serde(default)]
    message_id: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    #[serde(alias = "balance")]
    credit_balance: f64,
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn fetch_page(
        &self,
        direction: Direction,
        page: u32,
        page_size: u32,
    ) -> Result<FetchedPage, GatewayError> {
        let request = self.client.get(self.url("messages/all")).query(&[
            ("type", direction.gateway_type().to_string()),
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ]);

        let list: WireMessageList = self.execute("fetch_page", request).await?;
        let received = list.web_service_messages.len();

        let records: Vec<RawMessageRecord> = list
            .web_service_messages
            .into_iter()
            .filter_map(|wire| wire.into_record(direction))
            .collect();

        let dropped = received - records.len();
        if dropped > 0 {
            warn!(
                direction = %direction,
                page,
                dropped,
                "dropped gateway records without number or timestamp"
            );
            counters::gateway_records_dropped(direction.as_str(), dropped as u64);
        }

        debug!(direction = %direction, page, received, records = records.len(), "fetched page");
        Ok(FetchedPage { records, received })
    }

    async fn send_message(&self, recipient: &str, body: &str) -> Result<SendReceipt, GatewayError> {
        let request = self.client.post(self.url("sms/send")).json(&SendPayload {
            recipient_number: recipient,
            message: body,
        });

        let response: SendResponse = self.execute("send_message", request).await?;

        if let Some(reason) = response.error.filter(|e| !e.trim().is_empty()) {
            return Err(GatewayError::Rejected { reason });
        }

        Ok(SendReceipt {
            message_id: response.message_id.and_then(|v| match v {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            }),
        })
    }

    async fn balance(&self) -> Result<f64, GatewayError> {
        let request = self.client.get(self.url("account/balance"));
        let response: BalanceResponse = self.execute("balance", request).await?;
        Ok(response.credit_balance)
    }
}
