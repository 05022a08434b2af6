//! Failure Classification
//!
//! Maps a provider failure to the action the pool takes on the credential.
//! Providers do not agree on structured error codes, so the message text is
//! inspected as well as the status.

use std::fmt;

/// How a failed call affects the credential that made it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Too many requests; exponential cooldown
    RateLimited,
    /// Daily/monthly quota used up; flat cooldown
    QuotaExceeded,
    /// Key rejected by the provider; long cooldown
    InvalidCredential,
    /// The request itself is at fault; never retried
    Fatal,
}

impl ErrorClass {
    /// Whether another credential should be tried
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::QuotaExceeded => "quota_exceeded",
            ErrorClass::InvalidCredential => "invalid_credential",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Classify a failed call from its HTTP status and message
pub fn classify(status: Option<u16>, message: &str) -> ErrorClass {
    let lower = message.to_lowercase();

    if status == Some(429)
        || lower.contains("too many requests")
        || lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
    {
        return ErrorClass::RateLimited;
    }

    if lower.contains("quota")
        || lower.contains("limit exceeded")
        || lower.contains("resource_exhausted")
    {
        return ErrorClass::QuotaExceeded;
    }

    if matches!(status, Some(401) | Some(403)) || mentions_bad_key(&lower) {
        return ErrorClass::InvalidCredential;
    }

    ErrorClass::Fatal
}

// "invalid" alone also shows up in malformed-request errors ("invalid JSON
// payload"), so it only counts when it is about the key.
fn mentions_bad_key(lower: &str) -> bool {
    if lower.contains("api key not valid") || lower.contains("unauthorized") {
        return true;
    }
    lower.contains("invalid")
        && ["key", "credential", "token", "auth"]
            .iter()
            .any(|word| lower.contains(word))
}
