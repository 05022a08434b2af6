//! Keypool Error Types
//!
//! Errors raised by provider calls and by the credential pool itself.

use thiserror::Error;

/// Failure reported by a single provider call.
///
/// `status` carries the HTTP status when the provider answered; transport
/// failures and undecodable responses leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe_call(.status, .message))]
pub struct CallError {
    pub status: Option<u16>,
    pub message: String,
}

fn describe_call(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("provider returned {}: {}", code, message),
        None => format!("provider call failed: {}", message),
    }
}

impl CallError {
    /// Create an error for a response with an HTTP status
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create an error with no HTTP status (connection reset, bad payload, ...)
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        // The URL carries caller input (model, video id) that must not reach
        // the classifier.
        let err = err.without_url();
        let message = if err.is_timeout() {
            format!("Request timeout: {}", err)
        } else if err.is_connect() {
            format!("Connection failed: {}", err)
        } else if err.is_decode() {
            format!("Failed to decode response: {}", err)
        } else {
            err.to_string()
        };
        Self { status, message }
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::transport(format!("JSON parsing error: {}", err))
    }
}

/// Main error type for keypool operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// No credential was eligible, or every eligible one failed with a
    /// retryable error.
    #[error(
        "No API keys available for '{}', try again later{}",
        .provider,
        last_error_suffix(.last_error)
    )]
    Exhausted {
        provider: String,
        last_error: Option<CallError>,
    },

    /// Non-retryable provider failure, propagated unchanged
    #[error(transparent)]
    Call(#[from] CallError),

    /// Inbound request rejected by the abuse limiter
    #[error("Too many requests from '{identity}'")]
    RateLimited { identity: String },

    /// Configuration errors (invalid JSON, unreadable file, ...)
    #[error("Configuration error: {0}")]
    Config(String),
}

fn last_error_suffix(last_error: &Option<CallError>) -> String {
    match last_error {
        Some(err) => format!(" (last error: {})", err),
        None => String::new(),
    }
}

impl PoolError {
    /// HTTP status a route handler should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            PoolError::Exhausted { .. } | PoolError::RateLimited { .. } => 429,
            PoolError::Call(err) => err.status.unwrap_or(502),
            PoolError::Config(_) => 500,
        }
    }

    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::Exhausted { .. } | PoolError::RateLimited { .. }
        )
    }

    /// The provider error behind this failure, if any
    pub fn call_error(&self) -> Option<&CallError> {
        match self {
            PoolError::Exhausted { last_error, .. } => last_error.as_ref(),
            PoolError::Call(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        PoolError::Config(format!("IO error: {}", err))
    }
}

/// Result type alias for keypool operations
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_is_429_class() {
        let err = PoolError::Exhausted {
            provider: "GEMINI".to_string(),
            last_error: Some(CallError::new(429, "slow down")),
        };

        assert_eq!(err.status_code(), 429);
        assert!(err.is_retryable());
        assert_eq!(err.call_error().and_then(|e| e.status), Some(429));
        assert!(err.to_string().contains("last error"));
    }

    #[test]
    fn test_fatal_keeps_provider_status() {
        let err = PoolError::from(CallError::new(400, "bad request"));
        assert_eq!(err.status_code(), 400);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "provider returned 400: bad request");
    }

    #[test]
    fn test_transport_error_maps_to_bad_gateway() {
        let err = PoolError::from(CallError::transport("connection reset"));
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.to_string(), "provider call failed: connection reset");
    }
}
