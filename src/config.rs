use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::defaults;
use crate::error::{FarcasterError, Result};
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicy;
use crate::signer::validate_private_key_hex;

/// Validated client configuration. Builder methods consume the value and
/// return a new one; nothing mutates a config after construction.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    fid: u64,
    private_key_hex: Zeroizing<String>,
    retry_policy: RetryPolicy,
    rate_limit: RateLimitConfig,
    timeout_ms: u64,
    max_response_size: usize,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("fid", &self.fid)
            .field("private_key_hex", &"<redacted>")
            .field("retry_policy", &self.retry_policy)
            .field("rate_limit", &self.rate_limit)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_response_size", &self.max_response_size)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        fid: u64,
        private_key_hex: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            base_url: normalize_base_url(base_url.into()),
            fid,
            private_key_hex: Zeroizing::new(private_key_hex.into()),
            retry_policy: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            timeout_ms: defaults::TIMEOUT_MS,
            max_response_size: defaults::MAX_RESPONSE_SIZE,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// Required:
    /// - `FARCASTER_FID`: Farcaster ID
    /// - `FARCASTER_PRIVATE_KEY`: 128 hex characters (seed followed by public key)
    ///
    /// Optional:
    /// - `FARCASTER_HUB_URL`: hub base URL
    /// - `FARCASTER_TIMEOUT_MS`: request timeout
    /// - `FARCASTER_MAX_RESPONSE_SIZE`: response body limit in bytes
    /// - `FARCASTER_RATE_LIMIT_MAX`: requests per window
    /// - `FARCASTER_RATE_LIMIT_WINDOW_MS`: window length
    /// - `FARCASTER_RATE_LIMIT_ENABLED`: `false` disables throttling
    /// - `FARCASTER_RETRY_MAX_ATTEMPTS`: retry budget advertised to callers
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let fid: u64 = env::var("FARCASTER_FID")
            .map_err(|_| FarcasterError::config("FARCASTER_FID is required"))?
            .parse()
            .map_err(|_| FarcasterError::config("FARCASTER_FID must be a valid integer"))?;

        let private_key = env::var("FARCASTER_PRIVATE_KEY")
            .map_err(|_| FarcasterError::config("FARCASTER_PRIVATE_KEY is required"))?;

        let base_url =
            env::var("FARCASTER_HUB_URL").unwrap_or_else(|_| defaults::HUB_URL.to_string());

        let mut rate_limit = RateLimitConfig::default();
        if let Some(max) = parse_var("FARCASTER_RATE_LIMIT_MAX")? {
            rate_limit.max_requests = max;
        }
        if let Some(window) = parse_var("FARCASTER_RATE_LIMIT_WINDOW_MS")? {
            rate_limit.window_ms = window;
        }
        if let Ok(v) = env::var("FARCASTER_RATE_LIMIT_ENABLED") {
            rate_limit.enabled = v.to_lowercase() != "false";
        }

        let mut retry_policy = RetryPolicy::default();
        if let Some(attempts) = parse_var("FARCASTER_RETRY_MAX_ATTEMPTS")? {
            retry_policy.max_attempts = attempts;
        }

        let mut config = Self::new(base_url, fid, private_key)?
            .with_rate_limit(rate_limit)
            .with_retry_policy(retry_policy);

        if let Some(timeout) = parse_var("FARCASTER_TIMEOUT_MS")? {
            config = config.with_timeout_ms(timeout);
        }
        if let Some(size) = parse_var("FARCASTER_MAX_RESPONSE_SIZE")? {
            config = config.with_max_response_size(size);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(FarcasterError::config("hub base URL is required"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(FarcasterError::config(format!(
                "hub base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.fid == 0 {
            return Err(FarcasterError::config("FID must be a positive integer"));
        }
        validate_private_key_hex(&self.private_key_hex)?;
        if self.timeout_ms == 0 {
            return Err(FarcasterError::config("timeout_ms must be positive"));
        }
        if self.max_response_size == 0 {
            return Err(FarcasterError::config("max_response_size must be positive"));
        }
        if self.rate_limit.enabled
            && (self.rate_limit.max_requests == 0 || self.rate_limit.window_ms == 0)
        {
            return Err(FarcasterError::config(
                "rate limit needs a positive request count and window",
            ));
        }
        if self.retry_policy.max_delay_ms < self.retry_policy.base_delay_ms {
            return Err(FarcasterError::config(
                "retry max_delay_ms must be >= base_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(base_url.into());
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_response_size(mut self, max_response_size: usize) -> Self {
        self.max_response_size = max_response_size;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn fid(&self) -> u64 {
        self.fid
    }

    pub(crate) fn private_key_hex(&self) -> &str {
        &self.private_key_hex
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn rate_limit(&self) -> &RateLimitConfig {
        &self.rate_limit
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_response_size(&self) -> usize {
        self.max_response_size
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| FarcasterError::config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::tests::test_key_hex;

    #[test]
    fn test_config_new_applies_defaults() {
        let config = ClientConfig::new("http://localhost:2281/", 42, test_key_hex()).unwrap();
        assert_eq!(config.base_url(), "http://localhost:2281");
        assert_eq!(config.fid(), 42);
        assert_eq!(config.timeout(), Duration::from_millis(30_000));
        assert_eq!(config.max_response_size(), 16 * 1024 * 1024);
        assert_eq!(config.rate_limit(), &RateLimitConfig::new(100, 60_000));
        assert_eq!(config.retry_policy(), &RetryPolicy::default());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(ClientConfig::new("", 42, test_key_hex()).is_err());
        assert!(ClientConfig::new("ftp://hub", 42, test_key_hex()).is_err());
        assert!(ClientConfig::new("http://hub", 0, test_key_hex()).is_err());
        let err = ClientConfig::new("http://hub", 42, "abcd").unwrap_err();
        assert!(matches!(err, FarcasterError::Signing(_)));
    }

    #[test]
    fn test_builders_return_new_values() {
        let base = ClientConfig::new("http://hub", 42, test_key_hex()).unwrap();
        let tuned = base
            .clone()
            .with_timeout_ms(5_000)
            .with_max_response_size(1024)
            .with_rate_limit(RateLimitConfig::disabled());
        assert_eq!(base.timeout(), Duration::from_millis(30_000));
        assert_eq!(tuned.timeout(), Duration::from_millis(5_000));
        assert_eq!(tuned.max_response_size(), 1024);
        assert!(!tuned.rate_limit().enabled);
        assert!(tuned.validate().is_ok());
        assert!(tuned.with_timeout_ms(0).validate().is_err());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = ClientConfig::new("http://hub", 42, test_key_hex()).unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&test_key_hex()[..16]));
    }
}
