//! smsdesk: message history and bulk-send backend for a school SMS dashboard.
//!
//! Layers, leaves first:
//! - [`gateway`]: authenticated calls to the SMS provider
//! - [`fetcher`]: paced, paginated history walks
//! - [`cache`]: per-direction snapshot with single-flight background refresh
//! - [`grouping`]: per-recipient records folded into logical sends
//! - [`query`]: paginated, date-filtered views over cache or gateway
//! - [`sms`]: bulk send and balance relay
//! - [`api`]: HTTP surface
//! - [`bootstrap`]: wiring, periodic refresh, graceful shutdown

pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod gateway;
pub mod grouping;
pub mod query;
pub mod sms;
pub mod telemetry;
