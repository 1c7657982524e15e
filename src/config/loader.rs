use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::{Config, RateLimitConfig};

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let gateway = &self.gateway;

        if !gateway.mock {
            if gateway.email.trim().is_empty() || gateway.token.trim().is_empty() {
                anyhow::bail!("gateway email and token are required unless gateway.mock is set");
            }

            reqwest::Url::parse(&gateway.base_url)
                .with_context(|| format!("invalid gateway base_url: {}", gateway.base_url))?;
        }

        if self.fetch.page_size == 0 {
            anyhow::bail!("fetch.page_size must be at least 1");
        }

        if self.fetch.max_pages == 0 {
            anyhow::bail!("fetch.max_pages must be at least 1");
        }

        if let RateLimitConfig::TokenBucket { per_second, burst } = self.fetch.rate_limit {
            if per_second == 0 || burst == 0 {
                anyhow::bail!("token bucket per_second and burst must be at least 1");
            }
        }

        if let Some(interval) = self.cache.refresh_interval {
            if interval.is_zero() {
                anyhow::bail!("cache.refresh_interval must be greater than zero");
            }
        }

        if !(0.0..=1.0).contains(&self.telemetry.trace_sample_rate) {
            anyhow::bail!("telemetry.trace_sample_rate must be between 0.0 and 1.0");
        }

        info!("configuration validated successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_minimal_config() {
        let yaml = r#"
gateway:
  email: office@school.example
  token: abc123
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.address.port(), 8080);
        assert_eq!(config.gateway.base_url, crate::config::DEFAULT_GATEWAY_URL);
        assert!(config.gateway.timeout.is_none());
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.fetch.max_pages, 1000);
        assert_eq!(
            config.fetch.rate_limit,
            RateLimitConfig::Fixed {
                delay: Duration::from_millis(100)
            }
        );
        assert!(!config.cache.warm_on_start);
        assert!(config.cache.refresh_interval.is_none());
        assert_eq!(config.settings.shutdown.drain_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
server:
  address: "127.0.0.1:9000"
gateway:
  base_url: "https://gateway.example/api/v1/"
  email: office@school.example
  token: abc123
  timeout: 15s
fetch:
  page_size: 50
  max_pages: 20
  rate_limit:
    kind: token_bucket
    per_second: 5
    burst: 2
cache:
  warm_on_start: true
  refresh_interval: 5m
telemetry:
  log_level: debug
  json_logs: true
settings:
  shutdown:
    drain_timeout: 10s
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.address.port(), 9000);
        assert_eq!(config.gateway.timeout, Some(Duration::from_secs(15)));
        assert_eq!(
            config.fetch.rate_limit,
            RateLimitConfig::TokenBucket {
                per_second: 5,
                burst: 2
            }
        );
        assert_eq!(config.cache.refresh_interval, Some(Duration::from_secs(300)));
        assert!(config.telemetry.json_logs);
        assert_eq!(config.settings.shutdown.drain_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_fixed_delay_override() {
        let yaml = r#"
gateway:
  mock: true
fetch:
  rate_limit:
    kind: fixed
    delay: 250ms
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(
            config.fetch.rate_limit,
            RateLimitConfig::Fixed {
                delay: Duration::from_millis(250)
            }
        );
    }

    #[test]
    fn test_missing_credentials() {
        let result = Config::from_yaml("gateway:\n  email: office@school.example\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("email and token"));
    }

    #[test]
    fn test_mock_needs_no_credentials() {
        let config = Config::from_yaml("gateway:\n  mock: true\n").unwrap();
        assert!(config.gateway.mock);
    }

    #[test]
    fn test_zero_page_size() {
        let yaml = r#"
gateway:
  mock: true
fetch:
  page_size: 0
"#;
        let result = Config::from_yaml(yaml);
        assert!(result.unwrap_err().to_string().contains("page_size"));
    }

    #[test]
    fn test_bad_token_bucket() {
        let yaml = r#"
gateway:
  mock: true
fetch:
  rate_limit:
    kind: token_bucket
    per_second: 0
    burst: 1
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_bad_base_url() {
        let yaml = r#"
gateway:
  base_url: "not a url"
  email: office@school.example
  token: abc123
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_token_redacted_in_debug() {
        let config = Config::from_yaml("gateway:\n  email: a@b.c\n  token: s3cret\n").unwrap();
        let debug = format!("{:?}", config.gateway);
        assert!(!debug.contains("s3cret"));
    }
}
