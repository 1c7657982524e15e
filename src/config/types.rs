use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::fetcher::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};

/// Default gateway REST base URL
pub const DEFAULT_GATEWAY_URL: &str = "https://www.zoomconnect.com/app/api/rest/v1";

/// Root configuration for smsdesk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream SMS gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// History walk settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Message cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging and tracing
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

/// HTTP API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_server_address")]
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
        }
    }
}

fn default_server_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Gateway account and transport configuration
#[derive(Clone, Deserialize)]
pub struct GatewayConfig {
    /// REST base URL
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    /// Account email (sent as the `email` header)
    #[serde(default)]
    pub email: String,

    /// API token (sent as the `token` header)
    #[serde(default)]
    pub token: String,

    /// Per-request timeout; no timeout when unset
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,

    /// Use the in-memory gateway instead of the real provider
    #[serde(default)]
    pub mock: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            email: String::new(),
            token: String::new(),
            timeout: None,
            mock: false,
        }
    }
}

// Custom Debug to avoid leaking the token
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("mock", &self.mock)
            .finish()
    }
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

/// History walk configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Hard cap on pages per walk
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Pacing between page requests
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

/// Inter-page pacing strategy
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimitConfig {
    /// Sleep a fixed interval after every page
    Fixed {
        #[serde(default = "default_page_delay", with = "humantime_serde")]
        delay: Duration,
    },
    /// Token bucket with refill rate and burst
    TokenBucket { per_second: u32, burst: u32 },
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig::Fixed {
            delay: default_page_delay(),
        }
    }
}

fn default_page_delay() -> Duration {
    Duration::from_millis(100)
}

/// Message cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Trigger one refresh per direction at startup
    #[serde(default)]
    pub warm_on_start: bool,

    /// Periodic background refresh; disabled when unset
    #[serde(default, with = "humantime_serde::option")]
    pub refresh_interval: Option<Duration>,
}

/// Logging and tracing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// OTLP endpoint for distributed tracing
    pub otlp_endpoint: Option<String>,

    /// Trace sample rate (0.0 - 1.0)
    #[serde(default = "default_sample_rate")]
    pub trace_sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            otlp_endpoint: None,
            trace_sample_rate: default_sample_rate(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

/// Global settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Shutdown configuration
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// Shutdown configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// How long in-flight HTTP requests get to finish
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
        }
    }
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Humantime serde support module
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{self, Deserialize, Deserializer};
        use std::time::Duration;

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => humantime::parse_duration(&s)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
