//! Error types for the dyndns core.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// DNS resolution failed (non-success response code, no matching
    /// answers, malformed message)
    #[error("resolve error: {0}")]
    Resolve(String),

    /// The DNS exchange did not complete within the query timeout.
    ///
    /// Kept as its own variant: the resolver retry policy applies to
    /// timeouts only, every other error is returned to the caller as-is.
    #[error("dns query timed out after {0:?}")]
    Timeout(Duration),

    /// Current-IP acquisition failed
    #[error("ip source error: {0}")]
    IpSource(String),

    /// An update was rejected by a provider adapter
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Network-level I/O errors
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors from IP probing or provider APIs
    #[error("http error: {0}")]
    Http(String),

    /// The global restart ceiling was reached; repeated panics across
    /// domains indicate a systemic problem, not a transient one.
    #[error("restart budget exhausted after {restarts} restarts")]
    RestartBudgetExhausted {
        /// Total restarts performed before giving up
        restarts: usize,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resolve error
    pub fn resolve(msg: impl Into<String>) -> Self {
        Self::Resolve(msg.into())
    }

    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a transport timeout (the only retryable
    /// resolver failure).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
