//! Error types for the Farcaster hub client.

use std::collections::TryReserveError;

use thiserror::Error;

/// Result type alias for Farcaster operations.
pub type Result<T> = std::result::Result<T, FarcasterError>;

/// Farcaster hub client error types.
#[derive(Error, Debug)]
pub enum FarcasterError {
    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Failure while reading the response body
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// Request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Non-2xx response from the hub
    #[error("HTTP error: {message} (status: {status})")]
    Http {
        /// HTTP status code
        status: u16,
        /// Error detail reported by the hub, or the canonical reason
        message: String,
    },

    /// Malformed response body
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Outgoing message could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Key construction or signing failure
    #[error("Signing error: {0}")]
    Signing(String),

    /// Bad input to a public operation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Local admission control denied the request
    #[error("Rate limit exceeded for '{key}' (retry after: {retry_after_ms}ms)")]
    RateLimitExceeded {
        /// Limiter key that was rejected
        key: String,
        /// Milliseconds until the current window closes
        retry_after_ms: u64,
    },

    /// Response body exceeded `max_response_size`
    #[error("Response exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },

    /// Allocation failure
    #[error("Out of memory")]
    OutOfMemory,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Fieldless projection of [`FarcasterError`] used by retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Timeout,
    Http,
    JsonParse,
    Serialization,
    Signing,
    InvalidMessage,
    RateLimitExceeded,
    ResponseTooLarge,
    OutOfMemory,
    Config,
}

impl FarcasterError {
    /// Create a new HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a new signing error.
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Create a new invalid message error.
    pub fn invalid_message(msg: impl Into<String>) -> Self {
        Self::InvalidMessage(msg.into())
    }

    /// Create a new rate limit error.
    pub fn rate_limit(key: impl Into<String>, retry_after_ms: u64) -> Self {
        Self::RateLimitExceeded {
            key: key.into(),
            retry_after_ms,
        }
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Io(_) => ErrorKind::Network,
            Self::Timeout => ErrorKind::Timeout,
            Self::Http { .. } => ErrorKind::Http,
            Self::JsonParse(_) => ErrorKind::JsonParse,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Signing(_) => ErrorKind::Signing,
            Self::InvalidMessage(_) => ErrorKind::InvalidMessage,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::ResponseTooLarge { .. } => ErrorKind::ResponseTooLarge,
            Self::OutOfMemory => ErrorKind::OutOfMemory,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Check if this is a local rate limit rejection.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    /// Check if this is a network error.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Transient failures worth another attempt. HTTP errors qualify only
    /// for 5xx and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Io(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FarcasterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err)
        }
    }
}

impl From<std::io::Error> for FarcasterError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            Self::Timeout
        } else {
            Self::Io(err)
        }
    }
}

impl From<TryReserveError> for FarcasterError {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FarcasterError::invalid_message("cast text is empty");
        assert!(err.to_string().contains("cast text is empty"));
        assert_eq!(err.kind(), ErrorKind::InvalidMessage);
    }

    #[test]
    fn test_rate_limit_error() {
        let err = FarcasterError::rate_limit("castsByFid", 1500);
        assert!(err.is_rate_limit());
        assert!(err.to_string().contains("castsByFid"));
        assert!(err.to_string().contains("1500"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_http_error_retryable_only_for_server_side() {
        assert!(FarcasterError::http(503, "unavailable").is_retryable());
        assert!(FarcasterError::http(429, "slow down").is_retryable());
        assert!(!FarcasterError::http(404, "not found").is_retryable());
        assert!(FarcasterError::http(404, "not found")
            .to_string()
            .contains("404"));
    }

    #[test]
    fn test_try_reserve_maps_to_out_of_memory() {
        let mut buf: Vec<u8> = Vec::new();
        let err: FarcasterError = buf.try_reserve(usize::MAX).unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let err: FarcasterError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out").into();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        let err: FarcasterError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_signing_is_not_retryable() {
        let err = FarcasterError::signing("key mismatch");
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Signing);
    }
}
