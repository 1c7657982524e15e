//! Dashboard HTTP API using Axum.
//!
//! Provides endpoints for:
//! - Message history (/messages/sent, /messages/inbox)
//! - Cache control (/messages/background-fetch, /messages/cache-status and inbox variants)
//! - Sending (/sms/send, /sms/balance)
//! - Health checks (/healthz, /livez)
//! - Runtime stats (/stats) and metrics (/metrics)

mod handlers;
mod server;

pub use handlers::{ApiError, ErrorResponse, ListParams};
pub use server::{build_router, ApiServer, ApiState};
